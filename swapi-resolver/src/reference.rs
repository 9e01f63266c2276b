use swapi_core::Kind;

/// Extract the numeric id from a relation reference.
///
/// Accepted forms, for `Kind::People`:
/// ```text
/// https://www.swapi.tech/api/people/1
/// https://swapi.dev/api/people/1/
/// https://www.swapi.tech/api/people/1?expanded=true
/// 1
/// ```
/// The id is the run of ASCII digits directly after `/<path>/`, where `<path>`
/// is the upstream collection (`people`, `films`), ending at `/`, `?`, `#`, or
/// the end of the string. Returns `None` for anything else.
pub fn extract_id(kind: Kind, reference: &str) -> Option<&str> {
    let reference = reference.trim();
    if is_digits(reference) {
        return Some(reference);
    }

    let marker = format!("/{}/", kind.upstream_path());
    let start = reference.find(&marker)? + marker.len();
    let rest = &reference[start..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let id = &rest[..end];
    is_digits(id).then_some(id)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapi_tech_people_url() {
        assert_eq!(extract_id(Kind::People, "https://www.swapi.tech/api/people/1"), Some("1"));
    }

    #[test]
    fn swapi_dev_url_with_trailing_slash() {
        assert_eq!(extract_id(Kind::Movies, "https://swapi.dev/api/films/2/"), Some("2"));
    }

    #[test]
    fn query_and_fragment_terminate_the_id() {
        assert_eq!(extract_id(Kind::People, "https://x/api/people/13?expanded=true"), Some("13"));
        assert_eq!(extract_id(Kind::People, "https://x/api/people/14#top"), Some("14"));
    }

    #[test]
    fn bare_numeric_reference() {
        assert_eq!(extract_id(Kind::People, " 42 "), Some("42"));
    }

    #[test]
    fn movies_use_the_films_segment() {
        assert_eq!(extract_id(Kind::Movies, "https://www.swapi.tech/api/movies/1"), None);
        assert_eq!(extract_id(Kind::Movies, "https://www.swapi.tech/api/films/1"), Some("1"));
    }

    #[test]
    fn wrong_kind_segment_fails() {
        assert_eq!(extract_id(Kind::People, "https://www.swapi.tech/api/films/1"), None);
    }

    #[test]
    fn malformed_references_fail() {
        assert_eq!(extract_id(Kind::People, ""), None);
        assert_eq!(extract_id(Kind::People, "not a url"), None);
        assert_eq!(extract_id(Kind::People, "https://x/api/people/"), None);
        assert_eq!(extract_id(Kind::People, "https://x/api/people/abc"), None);
        assert_eq!(extract_id(Kind::People, "https://x/api/people/1a/"), None);
    }
}
