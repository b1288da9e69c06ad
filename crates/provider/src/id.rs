//! Resource identifier generation

use rand::Rng;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Number of random characters following the prefix
pub const RANDOM_LEN: usize = 16;

/// Generate `prefix` followed by [`RANDOM_LEN`] random lowercase alphanumerics.
///
/// Not cryptographically unique; collisions are left to chance.
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(prefix.len() + RANDOM_LEN);
    id.push_str(prefix);
    id.extend((0..RANDOM_LEN).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char));
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_have_prefix_and_length() {
        let id = generate_id("wo_data_");
        assert_eq!(id.len(), 24);
        assert!(id.starts_with("wo_data_"));
        assert!(id["wo_data_".len()..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id("wo_data_")).collect();
        assert_eq!(ids.len(), 1000);
    }
}
