//! Locating JSON inside model output.

/// Slice of `response` most likely to hold a JSON value delimited by
/// `open`/`close`.
///
/// Prefers a fenced code block, then the outermost delimiters, then the
/// trimmed response as-is.
pub(crate) fn extract_json(response: &str, open: char, close: char) -> &str {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        // Skip language identifier if present
        let content_start = response[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (response.find(open), response.rfind(close)) {
        if end > start {
            return &response[start..=end];
        }
    }

    response.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        assert_eq!(extract_json(" [\"a\", \"b\"] ", '[', ']'), "[\"a\", \"b\"]");
    }

    #[test]
    fn test_fenced_block() {
        let response = "Here you go:\n```json\n{\"status\": \"SUPPORTED\"}\n```";
        assert_eq!(extract_json(response, '{', '}'), "{\"status\": \"SUPPORTED\"}");

        let generic = "```\n[\"one claim here\"]\n```";
        assert_eq!(extract_json(generic, '[', ']'), "[\"one claim here\"]");
    }

    #[test]
    fn test_surrounding_prose() {
        let response = "The claims are [\"Paris is in France\"] as requested.";
        assert_eq!(extract_json(response, '[', ']'), "[\"Paris is in France\"]");
    }

    #[test]
    fn test_no_delimiters_returns_trimmed() {
        assert_eq!(extract_json("  no json here  ", '{', '}'), "no json here");
    }
}
