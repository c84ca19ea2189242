//! Static listings served when Firestore cannot be reached

use crate::models::{ContactVisibility, Property, PropertyType};
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;

struct Sample {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    price: f64,
    location: &'static str,
    area: f64,
    rooms: Option<u32>,
    property_type: PropertyType,
    featured: bool,
    created_ms: i64,
}

const SAMPLES: &[Sample] = &[
    Sample {
        id: "sample-1",
        title: "3-izbový byt s balkónom",
        description: "Kompletne zrekonštruovaný byt v tichej časti mesta, blízko MHD a obchodov.",
        price: 235_000.0,
        location: "Bratislava - Ružinov",
        area: 72.0,
        rooms: Some(3),
        property_type: PropertyType::Apartment,
        featured: true,
        created_ms: 1_714_550_400_000,
    },
    Sample {
        id: "sample-2",
        title: "Rodinný dom so záhradou",
        description: "Priestranný dom s garážou a udržiavanou záhradou na okraji mesta.",
        price: 389_000.0,
        location: "Senec",
        area: 168.0,
        rooms: Some(5),
        property_type: PropertyType::House,
        featured: true,
        created_ms: 1_714_464_000_000,
    },
    Sample {
        id: "sample-3",
        title: "Stavebný pozemok",
        description: "Rovinatý pozemok so všetkými inžinierskymi sieťami pri hranici pozemku.",
        price: 95_000.0,
        location: "Pezinok",
        area: 812.0,
        rooms: None,
        property_type: PropertyType::Land,
        featured: false,
        created_ms: 1_714_377_600_000,
    },
    Sample {
        id: "sample-4",
        title: "2-izbový byt v centre",
        description: "Svetlý byt v historickom centre, vhodný aj na investíciu.",
        price: 179_000.0,
        location: "Košice - Staré Mesto",
        area: 54.0,
        rooms: Some(2),
        property_type: PropertyType::Apartment,
        featured: false,
        created_ms: 1_714_291_200_000,
    },
    Sample {
        id: "sample-5",
        title: "Obchodný priestor na prízemí",
        description: "Výkladný priestor na frekventovanej ulici s vlastným vchodom.",
        price: 145_000.0,
        location: "Žilina",
        area: 88.0,
        rooms: Some(2),
        property_type: PropertyType::Commercial,
        featured: true,
        created_ms: 1_714_204_800_000,
    },
    Sample {
        id: "sample-6",
        title: "Chata pri jazere",
        description: "Útulná chata s terasou, 5 minút chôdze od vody.",
        price: 119_000.0,
        location: "Liptovská Mara",
        area: 64.0,
        rooms: Some(3),
        property_type: PropertyType::House,
        featured: false,
        created_ms: 1_714_118_400_000,
    },
];

static SAMPLE_PROPERTIES: Lazy<Vec<Property>> = Lazy::new(|| {
    SAMPLES
        .iter()
        .map(|s| Property {
            id: s.id.to_string(),
            created_at: Utc
                .timestamp_millis_opt(s.created_ms)
                .single()
                .unwrap_or_default(),
            title: s.title.to_string(),
            description: s.description.to_string(),
            price: s.price,
            location: s.location.to_string(),
            area: s.area,
            rooms: s.rooms,
            property_type: s.property_type,
            user_id: "sample".to_string(),
            images: Vec::new(),
            is_featured: Some(s.featured),
            is_new: Some(false),
            bathrooms: None,
            land_size: None,
            features: None,
            contact_name: None,
            contact_phone: None,
            contact_email: None,
            contact_visibility: Some(ContactVisibility::Hidden),
        })
        .collect()
});

/// The fallback dataset, newest first
pub fn sample_properties() -> Vec<Property> {
    SAMPLE_PROPERTIES.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_dataset_shape() {
        let samples = sample_properties();
        assert_eq!(samples.len(), SAMPLES.len());
        assert!(samples.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert!(samples.iter().all(|p| p.price > 0.0 && p.area > 0.0));
        assert!(samples.iter().any(|p| p.is_featured == Some(true)));
    }
}
