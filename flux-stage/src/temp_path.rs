use std::path::PathBuf;

/// Returns a random, not yet created, `.json` path inside the system temporary directory.
pub fn tmp_json_path() -> PathBuf {
    use rand::distributions::{Alphanumeric, DistString};

    const PREFIX: &str = "flux-stage-";
    const EXT: &str = ".json";
    const LEN: usize = 16;

    let mut name = String::with_capacity(PREFIX.len() + LEN + EXT.len());
    name.push_str(PREFIX);
    Alphanumeric.append_string(&mut rand::thread_rng(), &mut name, LEN);
    name.push_str(EXT);
    std::env::temp_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_unique_json_files() {
        let a = tmp_json_path();
        let b = tmp_json_path();
        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|ext| ext.to_str()), Some("json"));
        assert!(a.starts_with(std::env::temp_dir()));
    }
}
