//! Product backfill.
//!
//! Fills the products index with generated catalogue entries through the bulk
//! path, bypassing the event pipeline.

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, instrument};
use uuid::Uuid;

use search_sync_repository::{DocumentIndex, IndexStatus};
use search_sync_shared::{Dimensions, Manufacturer, ProductDocument};

use crate::errors::PipelineError;

/// Products written when the requested count is below one.
pub const DEFAULT_SEED_COUNT: usize = 100;

const BULK_CHUNK_SIZE: usize = 500;

const STATUSES: &[&str] = &["Available", "OutOfStock", "Discontinued"];

const ADJECTIVES: &[&str] = &[
    "Ergonomic", "Rustic", "Sleek", "Handcrafted", "Practical", "Refined", "Small", "Gorgeous",
    "Intelligent", "Licensed", "Tasty", "Generic",
];

const NOUNS: &[&str] = &[
    "Chair", "Table", "Lamp", "Shoes", "Keyboard", "Gloves", "Towels", "Bike", "Wallet", "Clock",
    "Sofa", "Backpack",
];

const CATEGORIES: &[&str] = &[
    "Home", "Garden", "Outdoors", "Sports", "Electronics", "Clothing", "Toys", "Books", "Tools",
    "Beauty",
];

const MATERIALS: &[&str] = &[
    "Wooden", "Steel", "Cotton", "Granite", "Plastic", "Rubber", "Fresh", "Frozen", "Concrete",
    "Metal", "Soft",
];

const COMPANIES: &[&str] = &[
    "Acme", "Globex", "Initech", "Umbrella", "Hooli", "Stark", "Wayne", "Vandelay",
];

const COUNTRIES: &[&str] = &[
    "Vietnam", "Germany", "Japan", "Brazil", "Canada", "Italy", "Kenya", "Norway",
];

const WORDS: &[&str] = &[
    "durable", "compact", "modern", "classic", "portable", "premium", "eco", "vintage",
    "wireless", "handmade", "limited", "lightweight",
];

fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}

/// Generate one random product.
pub fn generate_product<R: Rng + ?Sized>(rng: &mut R) -> ProductDocument {
    let now = Utc::now();
    let name = format!("{} {} {}", pick(rng, ADJECTIVES), pick(rng, MATERIALS), pick(rng, NOUNS));
    let tag_count = rng.gen_range(3..=6);

    ProductDocument {
        id: Uuid::new_v4(),
        description: format!("A {} {} for everyday use.", pick(rng, WORDS), name.to_lowercase()),
        name,
        price: (rng.gen_range(5.0..5000.0_f64) * 100.0).round() / 100.0,
        category: pick(rng, CATEGORIES).to_string(),
        material: pick(rng, MATERIALS).to_string(),
        manufacturing_date: Some(now - Duration::seconds(rng.gen_range(0..2 * 365 * 24 * 3600))),
        status: pick(rng, STATUSES).to_string(),
        dimensions: Dimensions {
            length: rng.gen_range(10.0..500.0),
            width: rng.gen_range(10.0..500.0),
            height: rng.gen_range(10.0..500.0),
        },
        tags: (0..tag_count).map(|_| pick(rng, WORDS).to_string()).collect(),
        manufacturer: Manufacturer {
            name: format!("{} {}", pick(rng, COMPANIES), pick(rng, &["Inc", "Group", "LLC", "GmbH"])),
            country: pick(rng, COUNTRIES).to_string(),
        },
        created_at: now,
        updated_at: None,
    }
}

pub fn generate_products<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<ProductDocument> {
    (0..count).map(|_| generate_product(rng)).collect()
}

/// Write `count` generated products (100 if `count` is zero) and return their
/// ids. Fails if the products index cannot be created.
#[instrument(skip(index))]
pub async fn seed_products(
    index: &DocumentIndex<ProductDocument>,
    count: usize,
) -> Result<Vec<Uuid>, PipelineError> {
    let count = if count < 1 { DEFAULT_SEED_COUNT } else { count };

    if index.ensure().await? == IndexStatus::Created {
        info!(index = %index.name(), "Index created for seeding");
    }

    let products = {
        let mut rng = rand::thread_rng();
        generate_products(&mut rng, count)
    };

    for chunk in products.chunks(BULK_CHUNK_SIZE) {
        index.bulk_upsert(chunk).await?;
    }

    info!(count, "Products seeded");
    Ok(products.into_iter().map(|p| p.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use search_sync_repository::{DocumentStore, InMemoryStore, SearchError};
    use search_sync_shared::SearchQuery;
    use std::sync::Arc;

    #[test]
    fn test_generated_products_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let products = generate_products(&mut rng, 50);

        assert_eq!(products.len(), 50);
        for product in &products {
            assert!((5.0..=5000.0).contains(&product.price));
            assert!((10.0..500.0).contains(&product.dimensions.width));
            assert!((3..=6).contains(&product.tags.len()));
            assert!(STATUSES.contains(&product.status.as_str()));
            assert!(product.manufacturing_date.unwrap() <= product.created_at);
            assert!(!product.name.is_empty());
        }
    }

    #[tokio::test]
    async fn test_seed_products_writes_searchable_documents() {
        let store = Arc::new(InMemoryStore::new());
        let index = DocumentIndex::<ProductDocument>::new(store.clone() as Arc<dyn DocumentStore>);

        let ids = seed_products(&index, 120).await.unwrap();

        assert_eq!(ids.len(), 120);
        assert_eq!(store.document_count("products").await, 120);
        assert!(store.index_settings("products").await.unwrap()["mappings"].is_object());
        let page = index.search(&SearchQuery::match_all().page(1, 10)).await.unwrap();
        assert_eq!(page.total, 120);
        assert_eq!(page.items.len(), 10);
    }

    #[tokio::test]
    async fn test_zero_count_seeds_default() {
        let store = Arc::new(InMemoryStore::new());
        let index = DocumentIndex::<ProductDocument>::new(store.clone() as Arc<dyn DocumentStore>);

        let ids = seed_products(&index, 0).await.unwrap();

        assert_eq!(ids.len(), DEFAULT_SEED_COUNT);
    }

    #[tokio::test]
    async fn test_seed_fails_without_index() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let index = DocumentIndex::<ProductDocument>::new(store as Arc<dyn DocumentStore>);

        let result = seed_products(&index, 5).await;

        assert!(matches!(
            result,
            Err(PipelineError::ReconciliationError(SearchError::ConnectionError(_)))
        ));
    }
}
