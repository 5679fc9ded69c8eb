use uuid::Uuid;

/// Source of identifiers for new users.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random (v4) UUIDs in hyphenated form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_unique_and_parseable() {
        let generator = UuidGenerator;
        let a = generator.new_id();
        let b = generator.new_id();

        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 4);
    }
}
