//! Pest grammar for schema declarations.

use pest_derive::Parser;

/// The `@schema` declaration parser.
#[derive(Parser)]
#[grammar = "parser/schema.pest"]
pub struct SchemaParser;

#[cfg(test)]
mod tests {
    use super::*;
    use pest::Parser;

    #[test]
    fn test_parse_identifier() {
        assert!(SchemaParser::parse(Rule::identifier, "author_id").is_ok());
        assert!(SchemaParser::parse(Rule::identifier, "1abc").is_err());
    }

    #[test]
    fn test_parse_field_type() {
        assert!(SchemaParser::parse(Rule::field_type, "string?").is_ok());
        assert!(SchemaParser::parse(Rule::field_type, "int(min: 0, max: 10)").is_ok());
        assert!(SchemaParser::parse(Rule::field_type, r#"enum["a", "b"]"#).is_ok());
    }

    #[test]
    fn test_parse_relation_type() {
        assert!(SchemaParser::parse(Rule::relation_type, "[Post] via author_id").is_ok());
        assert!(SchemaParser::parse(Rule::relation_type, "User via author_id").is_ok());
        assert!(
            SchemaParser::parse(Rule::relation_type, r#"[Post] via author_id where "x == 1""#)
                .is_ok()
        );
    }

    #[test]
    fn test_parse_option_values() {
        assert!(SchemaParser::parse(Rule::option_value, "now()").is_ok());
        assert!(SchemaParser::parse(Rule::option_value, "-3").is_ok());
        assert!(SchemaParser::parse(Rule::option_value, "2.5").is_ok());
        assert!(SchemaParser::parse(Rule::option_value, r#""x""#).is_ok());
    }
}
