pub const DEFAULT_AVATARS: [&str; 5] = [
    "https://hc-cdn.hel1.your-objectstorage.com/s/v3/4183627c4d26c56c915e104a8a7374f43acd1733_pfp__1_.png",
    "https://hc-cdn.hel1.your-objectstorage.com/s/v3/389b1e6bd4248a7e5dd88e14c1adb8eb01267080_pfp__2_.png",
    "https://hc-cdn.hel1.your-objectstorage.com/s/v3/03011a5e59548191de058f33ccd1d1cb1d64f2a0_pfp__3_.png",
    "https://hc-cdn.hel1.your-objectstorage.com/s/v3/f9c57b88fbd4633114c1864bcc2968db555dbd2a_pfp__4_.png",
    "https://hc-cdn.hel1.your-objectstorage.com/s/v3/e61a8cabee5a749588125242747b65122fb94205_pfp.png",
];

/// Polynomial rolling hash (`h * 31 + c`) over UTF-16 code units with 32-bit
/// wraparound. Thread ids and avatar buckets already handed out by running
/// bridges depend on these exact values.
pub(crate) fn identity_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Absolute value of [`identity_hash`], widened so `i32::MIN` stays positive.
pub(crate) fn identity_hash_abs(value: &str) -> u64 {
    i64::from(identity_hash(value)).unsigned_abs()
}

/// Picks a stable decorative icon for identities without a real avatar.
#[derive(Debug, Clone)]
pub struct AvatarSelector {
    pool: Vec<String>,
}

impl AvatarSelector {
    /// An empty pool falls back to the built-in icons.
    pub fn new(pool: Vec<String>) -> Self {
        let pool = if pool.is_empty() {
            DEFAULT_AVATARS.iter().map(|url| url.to_string()).collect()
        } else {
            pool
        };
        Self { pool }
    }

    pub fn avatar_for_identity(&self, identity: &str) -> &str {
        let index = (identity_hash_abs(identity) % self.pool.len() as u64) as usize;
        &self.pool[index]
    }
}

impl Default for AvatarSelector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::{AvatarSelector, DEFAULT_AVATARS, identity_hash};

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(identity_hash(""), 0);
        assert_eq!(identity_hash("a"), 97);
        assert_eq!(identity_hash("bob"), 97717);
        assert_eq!(identity_hash("alice"), 92903040);
        assert_eq!(identity_hash("日本"), 835047);
    }

    #[test]
    fn hash_wraps_instead_of_overflowing() {
        assert_eq!(identity_hash(&"z".repeat(64)), 1582229504);
    }

    #[test]
    fn same_nick_gets_same_avatar() {
        let selector = AvatarSelector::default();
        assert_eq!(
            selector.avatar_for_identity("testnick"),
            selector.avatar_for_identity("testnick")
        );
    }

    #[test]
    fn buckets_follow_hash_modulo_pool() {
        let selector = AvatarSelector::default();
        assert_eq!(selector.avatar_for_identity("alice"), DEFAULT_AVATARS[0]);
        assert_eq!(selector.avatar_for_identity("bob"), DEFAULT_AVATARS[2]);
        assert_eq!(selector.avatar_for_identity("x"), DEFAULT_AVATARS[0]);
    }

    #[test]
    fn empty_and_non_ascii_identities_are_accepted() {
        let selector = AvatarSelector::default();
        assert!(selector.avatar_for_identity("").starts_with("https://"));
        assert!(selector.avatar_for_identity("ñíçk_🎉").starts_with("https://"));
    }

    #[test]
    fn custom_pool_is_used() {
        let selector = AvatarSelector::new(vec!["https://one".to_string()]);
        assert_eq!(selector.avatar_for_identity("anyone"), "https://one");
    }
}
