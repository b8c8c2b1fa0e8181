//! Fenced code extraction for prompts that mix prose and code.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(?:python|py)?\s*(.*?)```").unwrap();
}

/// Returns the fenced blocks of `prompt`, trimmed and in order. A prompt
/// without any fence is treated as a single block of code.
pub fn extract_code_blocks(prompt: &str) -> Vec<String> {
    let blocks: Vec<String> = FENCED_BLOCK
        .captures_iter(prompt)
        .filter_map(|captures| captures.get(1))
        .map(|block| block.as_str().trim().to_string())
        .collect();
    if blocks.is_empty() {
        vec![prompt.trim().to_string()]
    } else {
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extracts_tagged_and_untagged_blocks() {
        let prompt = "First:\n```python\nx = 1\n```\nthen\n```\nprint(x)\n```\nand\n```py\ny = 2\n```";
        assert_eq!(
            extract_code_blocks(prompt),
            vec!["x = 1".to_string(), "print(x)".to_string(), "y = 2".to_string()]
        );
    }

    #[test]
    fn test_keeps_indentation_inside_block() {
        let prompt = "```python\ndef f():\n    return 1\n```";
        assert_eq!(extract_code_blocks(prompt), vec!["def f():\n    return 1"]);
    }

    #[test]
    fn test_plain_prompt_is_one_block() {
        assert_eq!(extract_code_blocks("  print(1)\n"), vec!["print(1)"]);
    }
}
