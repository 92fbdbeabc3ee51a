//! Escaping for dotted field paths.
//!
//! Field paths address nested document fields with `.`-separated segments.
//! Segment text may itself contain `.` or `&`, so a two-character escape is
//! used on the wire:
//!
//! ```text
//! path     = segment ( "." segment )*
//! segment  = ( char | escape )+
//! escape   = "&." | "&&"
//! char     = any char except "." "&"
//! ```
//!
//! `escape_field_names(["websites", "www.datastax.com", "visits"])` produces
//! `"websites.www&.datastax&.com.visits"`, and [`unescape_field_path`]
//! reverses it.

use thiserror::Error;

/// Errors produced while parsing an escaped field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldPathError {
    /// A `&` not followed by `&` or `.`.
    #[error("invalid field path '{path}': stray '&' at position {position}")]
    StrayAmpersand { path: String, position: usize },

    /// An empty segment, including leading/trailing dots.
    #[error("invalid field path '{path}': empty segment at position {position}")]
    EmptySegment { path: String, position: usize },
}

/// Joins path segments into a single escaped, dotted path.
///
/// Each segment has `&` doubled to `&&` and `.` rewritten to `&.`. Numeric
/// segments (array indices) render as their decimal text.
pub fn escape_field_names<I>(segments: I) -> String
where
    I: IntoIterator,
    I::Item: ToString,
{
    let mut out = String::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        for ch in segment.to_string().chars() {
            match ch {
                '&' => out.push_str("&&"),
                '.' => out.push_str("&."),
                other => out.push(other),
            }
        }
    }
    out
}

/// Splits an escaped, dotted path back into its segments.
///
/// The empty string is the empty path. Stray `&`, leading/trailing `.`, and
/// empty segments are rejected.
pub fn unescape_field_path(path: &str) -> Result<Vec<String>, FieldPathError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut segment_start = 0usize;
    let mut chars = path.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '&' => match chars.next() {
                Some((_, '&')) => current.push('&'),
                Some((_, '.')) => current.push('.'),
                _ => {
                    return Err(FieldPathError::StrayAmpersand {
                        path: path.to_string(),
                        position: i,
                    });
                }
            },
            '.' => {
                if current.is_empty() {
                    return Err(FieldPathError::EmptySegment {
                        path: path.to_string(),
                        position: segment_start,
                    });
                }
                segments.push(std::mem::take(&mut current));
                segment_start = i + 1;
            }
            other => current.push(other),
        }
    }

    if current.is_empty() {
        // A trailing '.' leaves the final segment empty.
        return Err(FieldPathError::EmptySegment {
            path: path.to_string(),
            position: segment_start,
        });
    }
    segments.push(current);

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_dots_inside_segments() {
        let path = escape_field_names(["websites", "www.datastax.com", "visits"]);
        assert_eq!(path, "websites.www&.datastax&.com.visits");
    }

    #[test]
    fn unescapes_back_to_segments() {
        let segments = unescape_field_path("websites.www&.datastax&.com.visits").unwrap();
        assert_eq!(segments, vec!["websites", "www.datastax.com", "visits"]);
    }

    #[test]
    fn numeric_segments_render_as_text() {
        let path = escape_field_names(vec![
            "shows".to_string(),
            "tom&jerry".to_string(),
            "episodes".to_string(),
            3.to_string(),
            "views".to_string(),
        ]);
        assert_eq!(path, "shows.tom&&jerry.episodes.3.views");
        assert_eq!(
            unescape_field_path(&path).unwrap(),
            vec!["shows", "tom&jerry", "episodes", "3", "views"]
        );
    }

    #[test]
    fn round_trips_arbitrary_segments() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["a"],
            vec!["a", "b", "c"],
            vec!["a.b", "c&d", "&&", "..."],
            vec!["&", "."],
        ];
        for segments in cases {
            let path = escape_field_names(segments.iter());
            assert_eq!(unescape_field_path(&path).unwrap(), segments);
        }
    }

    #[test]
    fn empty_path_round_trips() {
        assert_eq!(escape_field_names(Vec::<String>::new()), "");
        assert_eq!(unescape_field_path("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn rejects_stray_ampersand() {
        assert!(matches!(
            unescape_field_path("a&b"),
            Err(FieldPathError::StrayAmpersand { position: 1, .. })
        ));
        assert!(matches!(
            unescape_field_path("a&"),
            Err(FieldPathError::StrayAmpersand { .. })
        ));
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(matches!(
            unescape_field_path(".a"),
            Err(FieldPathError::EmptySegment { .. })
        ));
        assert!(matches!(
            unescape_field_path("a."),
            Err(FieldPathError::EmptySegment { .. })
        ));
        assert!(matches!(
            unescape_field_path("a..b"),
            Err(FieldPathError::EmptySegment { .. })
        ));
    }
}
