use nom::{
    bytes::complete::tag, character::complete::not_line_ending, combinator::map, error::context,
    sequence::preceded,
};

use super::token::{ParserResult, Token};

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_comment(input: &str) -> ParserResult<Token> {
    context(
        "comment",
        map(preceded(tag("#"), not_line_ending), |content: &str| {
            Token::Comment(content.trim().to_string())
        }),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_stops_at_line_end() {
        let (rest, token) = parse_comment("# total so far\nx = 1").unwrap();
        assert_eq!(token, Token::Comment("total so far".to_string()));
        assert_eq!(rest, "\nx = 1");
    }

    #[test]
    fn test_comment_at_eof() {
        let (rest, token) = parse_comment("#").unwrap();
        assert_eq!(token, Token::Comment(String::new()));
        assert_eq!(rest, "");
    }

    #[test]
    fn test_not_a_comment() {
        assert!(parse_comment("x # y").is_err());
    }
}
