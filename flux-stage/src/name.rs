fn is_ascii_lowercase_numeric(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'0'..=b'9')
}

fn is_ascii_lowercase_numeric_or_dash(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'0'..=b'9' | b'-')
}

/// Maximum length of an RFC 1123 label.
pub const RFC_1123_LABEL_MAX_LEN: usize = 63;

/// Returns true if the input matches the regex `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$` and is at most 63
/// characters long, see
/// https://kubernetes.io/docs/concepts/overview/working-with-objects/names/#dns-label-names.
///
/// Release names and instance names end up in Helm release names, file names and branch names, so
/// they are held to this format.
pub fn is_rfc_1123_label(value: &(impl AsRef<[u8]> + ?Sized)) -> bool {
    fn inner(value: &[u8]) -> bool {
        match value.len() {
            0 => false,
            1 => is_ascii_lowercase_numeric(value[0]),
            len if len > RFC_1123_LABEL_MAX_LEN => false,
            _ => {
                is_ascii_lowercase_numeric(value[0])
                    && value[1..value.len() - 1]
                        .iter()
                        .copied()
                        .all(is_ascii_lowercase_numeric_or_dash)
                    && is_ascii_lowercase_numeric(value[value.len() - 1])
            }
        }
    }
    inner(value.as_ref())
}

/// Returns true for a non-empty string of ASCII letters and digits. Commit hashes are treated as
/// opaque strings, abbreviated or not.
pub fn is_commit_hash_like(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

/// Returns true for an `owner/repository` pair as used by the git hosting API.
pub fn is_repository_slug(value: &str) -> bool {
    fn is_segment(segment: &str) -> bool {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'))
    }

    match value.split_once('/') {
        Some((owner, repository)) => is_segment(owner) && is_segment(repository),
        None => false,
    }
}
