use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

const DEFAULT_NODE_ID: i32 = 1;

/// Initialize the id generator for this server instance.
///
/// `node_id` (0-31) distinguishes instances writing to a shared
/// database; single-instance deployments keep the default of 1.
pub fn init(node_id: i32) {
    let mut gen = GENERATOR.lock().unwrap();
    *gen = Some(SnowflakeIdBucket::new(1, node_id));
}

/// Generate one snowflake id as a string.
///
/// Usable without `init`; the generator then lazily starts with the
/// default node id.
pub fn next_id() -> String {
    let mut gen = GENERATOR.lock().unwrap();
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, DEFAULT_NODE_ID));
    bucket.get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_numeric() {
        init(1);
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(id.parse::<i64>().is_ok(), "non-numeric id: {id}");
            assert!(ids.insert(id), "duplicate id generated");
        }
    }

    #[test]
    fn next_id_works_without_init() {
        let id = next_id();
        assert!(!id.is_empty());
    }
}
