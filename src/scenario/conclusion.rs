//! Conclusions: prioritized decisions over check results

use serde_yaml::Value;

use crate::error::DefinitionError;
use crate::props::{DecisionProperty, RaisesProperty};

/// A named boolean combination of checks which, when reached, raises one
/// finding. Higher priority wins among reached conclusions; equal
/// priorities resolve to the first defined.
pub struct Conclusion {
    name: String,
    priority: i64,
    decision: DecisionProperty,
    raises: RaisesProperty,
}

impl Conclusion {
    pub fn parse(at: &str, name: &str, value: &Value) -> Result<Self, DefinitionError> {
        let at = format!("{at}.{name}");
        let Value::Mapping(m) = value else {
            return Err(DefinitionError::invalid(&at, "a conclusion must be a mapping"));
        };

        let priority = match m.get("priority") {
            Some(v) => v
                .as_i64()
                .ok_or_else(|| DefinitionError::invalid(&at, "'priority' must be an integer"))?,
            None => 1,
        };

        let decision = m
            .get("decision")
            .ok_or_else(|| DefinitionError::invalid(&at, "a conclusion needs a 'decision'"))?;
        let decision = DecisionProperty::parse(&at, decision)?;

        let raises = m
            .get("raises")
            .ok_or_else(|| DefinitionError::invalid(&at, "a conclusion needs a 'raises'"))?;
        let raises = RaisesProperty::parse(&at, raises)?;

        Ok(Self {
            name: name.to_string(),
            priority,
            decision,
            raises,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn decision(&self) -> &DecisionProperty {
        &self.decision
    }

    pub fn raises(&self) -> &RaisesProperty {
        &self.raises
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Conclusion, DefinitionError> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        Conclusion::parse("scn.conclusions", "c", &value)
    }

    #[test]
    fn test_priority_defaults_to_one() {
        let c = parse("{decision: mycheck, raises: {message: hit}}").unwrap();
        assert_eq!(c.priority(), 1);
        assert_eq!(c.decision().check_names(), ["mycheck"]);
    }

    #[test]
    fn test_explicit_priority() {
        let c = parse("{priority: 5, decision: mycheck, raises: {message: hit}}").unwrap();
        assert_eq!(c.priority(), 5);
    }

    #[test]
    fn test_missing_pieces_fail() {
        assert!(parse("{raises: {message: hit}}").is_err());
        assert!(parse("{decision: mycheck}").is_err());
        assert!(parse("just-a-string").is_err());
    }
}
