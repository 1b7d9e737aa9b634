//! Read-through caching with tag invalidation over the in-memory backend.

use resilient_cache::{
    backend::InMemoryBackend, observability::StatsMetrics, CacheBuilder, CacheEntity,
    CacheKeyBuilder, CacheStrategy, SetOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Example entity: Story
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Story {
    id: u64,
    title: String,
    section: String,
}

impl CacheEntity for Story {
    type Key = u64;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn cache_prefix() -> &'static str {
        "story"
    }
}

#[derive(Debug)]
struct NotFound(u64);

/// Mock repository that simulates database access
struct StoryRepository {
    stories: HashMap<u64, Story>,
}

impl StoryRepository {
    fn new() -> Self {
        let stories = [(1, "Launch day", "news"), (2, "Quarterly results", "business")]
            .into_iter()
            .map(|(id, title, section)| {
                (
                    id,
                    Story {
                        id,
                        title: title.to_string(),
                        section: section.to_string(),
                    },
                )
            })
            .collect();
        StoryRepository { stories }
    }

    async fn find(&self, id: u64) -> Result<Story, NotFound> {
        println!("  [DB] Fetching story: {}", id);
        self.stories.get(&id).cloned().ok_or(NotFound(id))
    }

    async fn by_section(&self, section: &str) -> Vec<Story> {
        println!("  [DB] Listing section: {}", section);
        let mut stories: Vec<Story> = self
            .stories
            .values()
            .filter(|story| story.section == section)
            .cloned()
            .collect();
        stories.sort_by_key(|story| story.id);
        stories
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Resilient Cache - Read-Through Example ===\n");

    // 1. Initialize cache
    println!("1. Connecting in-memory cache backend...");
    let stats = StatsMetrics::new();
    let cache = CacheBuilder::new()
        .with_metrics(stats.clone())
        .connect(InMemoryBackend::new())
        .await;
    let repository = StoryRepository::new();
    println!("   ✓ Cache state: {}\n", cache.state());

    let options = SetOptions::new()
        .with_ttl(Duration::from_secs(300))
        .with_tag("stories");

    // 2. First request - cache miss, fetch from database
    println!("2. First request for story 1:");
    let key = CacheKeyBuilder::build::<Story>(&1);
    match cache
        .wrap(&key, options.clone(), || repository.find(1))
        .await
    {
        Ok(story) => println!("   ✓ Story loaded: {}\n", story.title),
        Err(NotFound(id)) => println!("   ✗ Story {} not found\n", id),
    }

    // 3. Second request - cache hit
    println!("3. Second request for story 1:");
    if let Ok(story) = cache
        .wrap(&key, options.clone(), || repository.find(1))
        .await
    {
        println!("   ✓ Story loaded from cache: {}\n", story.title);
    }

    // 4. Producer errors are returned and never cached
    println!("4. Request for a missing story:");
    let missing = CacheKeyBuilder::build::<Story>(&99);
    if let Err(NotFound(id)) = cache
        .wrap(&missing, options.clone(), || repository.find(99))
        .await
    {
        println!("   ✓ Story {} not found, nothing cached\n", id);
    }

    // 5. Collection keys are stable under filter field order
    println!("5. Collection request:");
    let filter = serde_json::json!({ "section": "news", "page": 1 });
    if let Ok(list_key) = CacheKeyBuilder::collection_for::<Story, _>(&filter) {
        let stories: Result<Vec<Story>, NotFound> = cache
            .wrap(&list_key, options.clone(), || async {
                Ok(repository.by_section("news").await)
            })
            .await;
        println!("   ✓ {} stories under {}\n", stories.map(|s| s.len()).unwrap_or(0), list_key);
    }

    // 6. Invalidate strategy - force refresh
    println!("6. Invalidate strategy (force refresh):");
    if let Ok(story) = cache
        .wrap_with(&key, options.clone(), CacheStrategy::Invalidate, || {
            repository.find(1)
        })
        .await
    {
        println!("   ✓ Story refreshed from database: {}\n", story.title);
    }

    // 7. Tag invalidation drops the entity and the collection together
    println!("7. Invalidating tag 'stories':");
    let members = cache.tag_members("stories").await;
    println!("   Tagged keys: {:?}", members);
    cache.invalidate_tag("stories").await;
    println!("   ✓ {} still cached: {}\n", key, cache.exists(&key).await);

    let snapshot = stats.snapshot();
    println!(
        "Stats: {} hits, {} misses, {} sets, {} errors (hit rate {:.0}%)",
        snapshot.hits,
        snapshot.misses,
        snapshot.sets,
        snapshot.errors,
        snapshot.hit_rate() * 100.0
    );

    println!("\n=== Example Complete ===\n");
}
