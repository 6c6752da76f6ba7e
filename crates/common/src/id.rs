//! ID generation utilities.

use ulid::Ulid;

/// ID generator for polls, options, ballots and comments.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lower-case ULID.
    ///
    /// IDs sort by creation time, which the list endpoints rely on for
    /// `untilId` cursor pagination.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate `count` IDs in ascending order.
    ///
    /// Used for poll options so that ID order matches display order.
    #[must_use]
    pub fn generate_ordered(&self, count: usize) -> Vec<String> {
        let mut generator = ulid::Generator::new();
        (0..count)
            .map(|_| {
                generator
                    .generate()
                    .unwrap_or_else(|_| Ulid::new())
                    .to_string()
                    .to_lowercase()
            })
            .collect()
    }
}
