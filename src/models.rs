//! Listing site data model
//!
//! Plain DTOs mirrored 1:1 onto Firestore documents. Field names are
//! camelCase on the wire to match the documents the web front end writes.

use crate::error::FirebaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// Flat in a shared building
    Apartment,
    /// Detached or terraced house
    House,
    /// Building plot or agricultural land
    Land,
    /// Office, retail or industrial space
    Commercial,
}

impl PropertyType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::House => "house",
            Self::Land => "land",
            Self::Commercial => "commercial",
        }
    }
}

/// Who may see a listing's contact details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactVisibility {
    /// Everyone
    #[default]
    Public,
    /// Signed-in users only
    Registered,
    /// Nobody; visitors must use messages
    Hidden,
}

/// Contact details shown on a listing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    /// Name
    pub name: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Email address
    pub email: Option<String>,
}

/// Property listing (`properties/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Document ID; not stored as a field
    #[serde(default)]
    pub id: String,
    /// Creation time
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Listing headline
    pub title: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Asking price in EUR
    pub price: f64,
    /// Town or district, free text
    pub location: String,
    /// Floor area in square meters
    pub area: f64,
    /// Number of rooms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<u32>,
    /// Kind of property
    pub property_type: PropertyType,
    /// Owner UID
    pub user_id: String,
    /// Download URLs of the listing photos
    #[serde(default)]
    pub images: Vec<String>,
    /// Shown in the featured section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
    /// Marked as a new listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    /// Number of bathrooms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    /// Plot size in square meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_size: Option<f64>,
    /// Amenities such as a balcony or parking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    /// Contact person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    /// Contact phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    /// Contact email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    /// Who may see the contact details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_visibility: Option<ContactVisibility>,
}

impl Property {
    /// True if `user_id` owns the listing
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Contact details visible to a viewer, honoring `contactVisibility`
    pub fn visible_contact(&self, viewer_signed_in: bool) -> Option<Contact> {
        match self.contact_visibility.unwrap_or_default() {
            ContactVisibility::Hidden => return None,
            ContactVisibility::Registered if !viewer_signed_in => return None,
            _ => {}
        }
        let contact = Contact {
            name: self.contact_name.clone(),
            phone: self.contact_phone.clone(),
            email: self.contact_email.clone(),
        };
        if contact == Contact::default() {
            return None;
        }
        Some(contact)
    }

    /// Price per square meter, when the area is known
    pub fn price_per_sqm(&self) -> Option<f64> {
        (self.area > 0.0).then(|| self.price / self.area)
    }
}

/// Listing form input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProperty {
    /// Listing headline
    pub title: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Asking price in EUR
    pub price: f64,
    /// Town or district, free text
    pub location: String,
    /// Floor area in square meters
    pub area: f64,
    /// Number of rooms
    #[serde(default)]
    pub rooms: Option<u32>,
    /// Kind of property
    pub property_type: PropertyType,
    /// Number of bathrooms
    #[serde(default)]
    pub bathrooms: Option<u32>,
    /// Plot size in square meters
    #[serde(default)]
    pub land_size: Option<f64>,
    /// Amenities such as a balcony or parking
    #[serde(default)]
    pub features: Option<Vec<String>>,
    /// Contact person
    #[serde(default)]
    pub contact_name: Option<String>,
    /// Contact phone number
    #[serde(default)]
    pub contact_phone: Option<String>,
    /// Contact email address
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Who may see the contact details
    #[serde(default)]
    pub contact_visibility: Option<ContactVisibility>,
}

impl NewProperty {
    /// Reject form input the listing pages cannot display
    pub fn validate(&self) -> Result<(), FirebaseError> {
        validate_listing(Some(&self.title), Some(self.price), Some(self.area))
    }

    /// Build the listing document for `owner`
    pub fn into_property(self, owner: &str, images: Vec<String>, created_at: DateTime<Utc>) -> Property {
        Property {
            id: String::new(),
            created_at,
            title: self.title.trim().to_string(),
            description: self.description,
            price: self.price,
            location: self.location,
            area: self.area,
            rooms: self.rooms,
            property_type: self.property_type,
            user_id: owner.to_string(),
            images,
            is_featured: Some(false),
            is_new: Some(true),
            bathrooms: self.bathrooms,
            land_size: self.land_size,
            features: self.features,
            contact_name: self.contact_name,
            contact_phone: self.contact_phone,
            contact_email: self.contact_email,
            contact_visibility: self.contact_visibility,
        }
    }
}

/// Partial listing update from the edit form; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyUpdate {
    /// Listing headline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-text description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Asking price in EUR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Town or district, free text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Floor area in square meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    /// Number of rooms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<u32>,
    /// Kind of property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    /// Replacement photo URLs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Number of bathrooms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    /// Plot size in square meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_size: Option<f64>,
    /// Amenities such as a balcony or parking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    /// Contact person
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    /// Contact phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    /// Contact email address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    /// Who may see the contact details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_visibility: Option<ContactVisibility>,
}

impl PropertyUpdate {
    /// Validate only the fields being changed
    pub fn validate(&self) -> Result<(), FirebaseError> {
        validate_listing(self.title.as_ref(), self.price, self.area)
    }

    /// True when nothing would change
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn validate_listing(title: Option<&String>, price: Option<f64>, area: Option<f64>) -> Result<(), FirebaseError> {
    if let Some(title) = title {
        if title.trim().is_empty() {
            return Err(FirebaseError::Validation("Title is required".to_string()));
        }
    }
    if let Some(price) = price {
        if !price.is_finite() || price <= 0.0 {
            return Err(FirebaseError::Validation("Price must be greater than zero".to_string()));
        }
    }
    if let Some(area) = area {
        if !area.is_finite() || area <= 0.0 {
            return Err(FirebaseError::Validation("Area must be greater than zero".to_string()));
        }
    }
    Ok(())
}

/// Listing search criteria from the listings page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    /// Only this kind of property
    pub property_type: Option<PropertyType>,
    /// Lowest asking price
    pub min_price: Option<f64>,
    /// Highest asking price
    pub max_price: Option<f64>,
    /// At least this many rooms; listings without a room count never match
    pub min_rooms: Option<u32>,
    /// Smallest floor area
    pub min_area: Option<f64>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
    /// Only featured listings
    pub featured_only: bool,
}

impl PropertyFilter {
    /// True if `property` satisfies every set criterion
    pub fn matches(&self, property: &Property) -> bool {
        if let Some(kind) = self.property_type {
            if property.property_type != kind {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| property.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| property.price > max) {
            return false;
        }
        if let Some(min_rooms) = self.min_rooms {
            if property.rooms.map_or(true, |rooms| rooms < min_rooms) {
                return false;
            }
        }
        if self.min_area.is_some_and(|min| property.area < min) {
            return false;
        }
        if let Some(location) = &self.location {
            let needle = location.trim().to_lowercase();
            if !needle.is_empty() && !property.location.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if self.featured_only && property.is_featured != Some(true) {
            return false;
        }
        true
    }
}

/// User profile (`users/{uid}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Auth UID
    #[serde(default)]
    pub id: String,
    /// Sign-in email
    pub email: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Creation time
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// Per-user preferences (`userSettings/{uid}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Auth UID
    #[serde(default)]
    pub id: String,
    /// UI language code, `sk` by default
    #[serde(default = "default_language")]
    pub language: String,
    /// Send an email when a message arrives
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    /// Visibility preselected in the listing form
    #[serde(default)]
    pub default_contact_visibility: ContactVisibility,
}

fn default_language() -> String {
    "sk".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            language: default_language(),
            email_notifications: true,
            default_contact_visibility: ContactVisibility::default(),
        }
    }
}

/// Message about a listing (`messages/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Document ID; not stored as a field
    #[serde(default)]
    pub id: String,
    /// Listing the message is about
    pub property_id: String,
    /// Sender UID
    pub sender_id: String,
    /// Recipient UID
    pub recipient_id: String,
    /// Message text
    pub content: String,
    /// Seen by the recipient
    #[serde(default)]
    pub read: bool,
    /// Send time
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// Saved listing (`favorites/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    /// Document ID; not stored as a field
    #[serde(default)]
    pub id: String,
    /// UID of the user who saved the listing
    pub user_id: String,
    /// Saved listing
    pub property_id: String,
    /// When the listing was saved
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing() -> Property {
        serde_json::from_value(json!({
            "id": "p1",
            "createdAt": "2024-05-01T08:00:00Z",
            "title": "2-izbový byt, Ružinov",
            "price": 189000,
            "location": "Bratislava - Ružinov",
            "area": 54,
            "rooms": 2,
            "propertyType": "apartment",
            "userId": "owner",
            "images": [],
            "contactName": "Peter",
            "contactVisibility": "registered"
        }))
        .unwrap()
    }

    #[test]
    fn test_property_wire_format() {
        let property = listing();
        assert_eq!(property.price, 189000.0);
        let value = serde_json::to_value(&property).unwrap();
        assert_eq!(value["propertyType"], "apartment");
        assert_eq!(value["userId"], "owner");
        assert!(value.get("bathrooms").is_none());
    }

    #[test]
    fn test_contact_visibility() {
        let property = listing();
        assert!(property.visible_contact(false).is_none());
        assert_eq!(property.visible_contact(true).unwrap().name.as_deref(), Some("Peter"));
    }

    #[test]
    fn test_new_property_validation() {
        let mut input = NewProperty {
            title: "Pozemok".into(),
            description: String::new(),
            price: 0.0,
            location: "Senec".into(),
            area: 800.0,
            rooms: None,
            property_type: PropertyType::Land,
            bathrooms: None,
            land_size: Some(800.0),
            features: None,
            contact_name: None,
            contact_phone: None,
            contact_email: None,
            contact_visibility: None,
        };
        assert!(matches!(input.validate(), Err(FirebaseError::Validation(_))));
        input.price = 45000.0;
        assert!(input.validate().is_ok());

        let property = input.into_property("u1", vec![], Utc::now());
        assert_eq!(property.is_new, Some(true));
        assert!(property.is_owned_by("u1"));
    }

    #[test]
    fn test_update_only_serializes_changes() {
        let update = PropertyUpdate {
            price: Some(175000.0),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({"price": 175000.0}));
        assert!(PropertyUpdate::default().is_empty());
    }

    #[test]
    fn test_filter() {
        let property = listing();
        let filter = PropertyFilter {
            property_type: Some(PropertyType::Apartment),
            max_price: Some(200000.0),
            min_rooms: Some(2),
            location: Some("ružinov".into()),
            ..Default::default()
        };
        assert!(filter.matches(&property));
        assert!(!PropertyFilter { min_rooms: Some(3), ..Default::default() }.matches(&property));
        assert!(!PropertyFilter { featured_only: true, ..Default::default() }.matches(&property));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: UserSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.language, "sk");
        assert!(settings.email_notifications);
    }
}
