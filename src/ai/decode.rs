//! Decode stage: turns a raw LLM completion into a [`serde_json::Value`].
//!
//! LLMs wrap JSON in code fences, leave trailing commas, truncate mid-string
//! when they hit a token limit, or pad the answer with prose. This repairs
//! the common cases before giving up and reporting a decode failure.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{PipelineError, Result};

const MAX_REPAIR_ATTEMPTS: usize = 3;

/// Primary entry point: parse `content`, repairing if the first parse fails.
pub fn decode_json(content: &str) -> Result<Value> {
    decode_json_with_repair_status(content).map(|(value, _)| value)
}

/// Same as [`decode_json`] but also reports whether repair was needed, so
/// callers can log a decode-quality signal without re-parsing.
pub fn decode_json_with_repair_status(content: &str) -> Result<(Value, bool)> {
    let repairer = JsonRepairer::new();
    repairer.parse_or_repair(content)
}

struct JsonRepairer {
    max_repair_attempts: usize,
}

impl JsonRepairer {
    fn new() -> Self {
        Self {
            max_repair_attempts: MAX_REPAIR_ATTEMPTS,
        }
    }

    fn parse_or_repair(&self, raw: &str) -> Result<(Value, bool)> {
        let cleaned = self.preprocess(raw);

        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            return Ok((value, false));
        }

        debug!("initial JSON parse failed, attempting repair");

        for attempt in 1..=self.max_repair_attempts {
            let repaired = self.repair_attempt(&cleaned, attempt);
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                warn!(attempt, "JSON repaired");
                return Ok((value, true));
            }
        }

        if let Some(extracted) = self.extract_json_from_mixed(&cleaned)
            && let Ok(value) = serde_json::from_str::<Value>(&extracted)
        {
            warn!("JSON extracted from mixed content");
            return Ok((value, true));
        }

        Err(PipelineError::decode(
            cleaned.chars().take(200).collect::<String>(),
            format!("failed to parse or repair JSON after {} attempts", self.max_repair_attempts),
        ))
    }

    fn preprocess(&self, raw: &str) -> String {
        let mut s = raw.trim().to_string();
        s = self.strip_code_fences(&s);
        s = s.trim_start_matches('\u{feff}').to_string();
        s.trim().to_string()
    }

    fn strip_code_fences(&self, s: &str) -> String {
        let mut result = s.to_string();
        if result.starts_with("```")
            && let Some(first_newline) = result.find('\n')
        {
            result = result[first_newline + 1..].to_string();
        }
        if result.ends_with("```") {
            result = result[..result.len() - 3].trim_end().to_string();
        }
        result
    }

    fn repair_attempt(&self, s: &str, level: usize) -> String {
        let mut result = s.to_string();
        match level {
            1 => {
                result = self.fix_trailing_commas(&result);
                result = self.balance_brackets(&result);
            }
            2 => {
                result = self.fix_trailing_commas(&result);
                result = self.fix_truncated_strings(&result);
                result = self.balance_brackets(&result);
            }
            _ => {
                result = self.fix_trailing_commas(&result);
                result = self.remove_control_chars(&result);
                result = self.fix_truncated_strings(&result);
                result = self.balance_brackets(&result);
                result = self.truncate_to_valid(&result);
            }
        }
        result
    }

    fn fix_trailing_commas(&self, s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == ',' {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if j < chars.len() && (chars[j] == ']' || chars[j] == '}') {
                    i += 1;
                    continue;
                }
            }
            result.push(ch);
            i += 1;
        }
        result
    }

    fn balance_brackets(&self, s: &str) -> String {
        let mut result = s.to_string();
        let mut brace_count = 0;
        let mut bracket_count = 0;
        let mut in_string = false;
        let mut escape = false;

        for ch in result.chars() {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                '{' if !in_string => brace_count += 1,
                '}' if !in_string => brace_count -= 1,
                '[' if !in_string => bracket_count += 1,
                ']' if !in_string => bracket_count -= 1,
                _ => {}
            }
        }

        if in_string {
            result.push('"');
        }
        for _ in 0..bracket_count {
            result.push(']');
        }
        for _ in 0..brace_count {
            result.push('}');
        }
        result
    }

    fn fix_truncated_strings(&self, s: &str) -> String {
        let mut result = String::with_capacity(s.len() + 10);
        let mut in_string = false;
        let mut escape = false;

        for ch in s.chars() {
            if escape {
                escape = false;
                result.push(ch);
                continue;
            }
            match ch {
                '\\' if in_string => {
                    escape = true;
                    result.push(ch);
                }
                '"' => {
                    in_string = !in_string;
                    result.push(ch);
                }
                '\n' | '\r' if in_string => {
                    result.push('"');
                    in_string = false;
                    result.push(ch);
                }
                _ => result.push(ch),
            }
        }
        if in_string {
            result.push('"');
        }
        result
    }

    fn remove_control_chars(&self, s: &str) -> String {
        s.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\r' || *c == '\t')
            .collect()
    }

    fn truncate_to_valid(&self, s: &str) -> String {
        let mut last_valid = 0;
        let mut brace_count = 0;
        let mut bracket_count = 0;
        let mut in_string = false;
        let mut escape = false;

        for (i, ch) in s.char_indices() {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                '{' if !in_string => brace_count += 1,
                '}' if !in_string => {
                    brace_count -= 1;
                    if brace_count == 0 && bracket_count == 0 {
                        last_valid = i + 1;
                    }
                }
                '[' if !in_string => bracket_count += 1,
                ']' if !in_string => {
                    bracket_count -= 1;
                    if brace_count == 0 && bracket_count == 0 {
                        last_valid = i + 1;
                    }
                }
                _ => {}
            }
        }

        if last_valid > 0 && last_valid < s.len() {
            s[..last_valid].to_string()
        } else {
            s.to_string()
        }
    }

    fn extract_json_from_mixed(&self, s: &str) -> Option<String> {
        let start = s.find(['{', '['])?;
        let start_char = s.chars().nth(start)?;
        let end_char = if start_char == '{' { '}' } else { ']' };

        let mut brace_depth = 0;
        let mut bracket_depth = 0;
        let mut in_string = false;
        let mut escape = false;
        let mut end = start;

        for (i, ch) in s[start..].char_indices() {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                '{' if !in_string => brace_depth += 1,
                '}' if !in_string => {
                    brace_depth -= 1;
                    if brace_depth == 0 && bracket_depth == 0 && ch == end_char {
                        end = start + i + 1;
                        break;
                    }
                }
                '[' if !in_string => bracket_depth += 1,
                ']' if !in_string => {
                    bracket_depth -= 1;
                    if brace_depth == 0 && bracket_depth == 0 && ch == end_char {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }

        if end > start { Some(s[start..end].to_string()) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_json_without_repair() {
        let (_, repaired) = decode_json_with_repair_status(r#"{"key": "value"}"#).unwrap();
        assert!(!repaired);
    }

    #[test]
    fn strips_code_fences() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        let value = decode_json(input).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn fixes_trailing_comma() {
        let input = r#"{"pages": [{"index": 1},]}"#;
        let (value, repaired) = decode_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert!(value["pages"].is_array());
    }

    #[test]
    fn balances_missing_closers() {
        let input = r#"{"pages": [{"index": 1}"#;
        let (value, repaired) = decode_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert!(value["pages"].is_array());
    }

    #[test]
    fn extracts_from_surrounding_prose() {
        let input = "Here is the analysis:\n{\"pages\": [{\"index\": 1}]}\nHope this helps!";
        let (value, repaired) = decode_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert!(value["pages"].is_array());
    }

    #[test]
    fn reports_decode_failure_for_unrecoverable_garbage() {
        let err = decode_json("not json at all, just prose").unwrap_err();
        assert!(err.should_degrade());
    }
}
