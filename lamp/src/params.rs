//! Named numeric parameter mappings shared by source profiles and lens components.

use std::collections::BTreeMap;

use crate::error::LampError;

/// Read-only view of a named parameter mapping, validated against a schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParamSet<'a> {
    owner: &'a str,
    values: &'a BTreeMap<String, f64>,
}

impl<'a> ParamSet<'a> {
    /// Check `values` against `required` and `optional` keys.
    ///
    /// Missing required keys, unknown keys and non-finite values are all
    /// configuration errors naming `owner`.
    pub(crate) fn validate(
        owner: &'a str,
        values: &'a BTreeMap<String, f64>,
        required: &[&str],
        optional: &[&str],
    ) -> Result<Self, LampError> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| !values.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(LampError::config(format!(
                "{owner}: missing parameter(s) {}",
                missing.join(", ")
            )));
        }

        let unknown: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|key| !required.contains(key) && !optional.contains(key))
            .collect();
        if !unknown.is_empty() {
            let mut expected: Vec<&str> = required.to_vec();
            expected.extend_from_slice(optional);
            return Err(LampError::config(format!(
                "{owner}: unexpected parameter(s) {} (expected {})",
                unknown.join(", "),
                expected.join(", ")
            )));
        }

        if let Some((key, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(LampError::config(format!(
                "{owner}: parameter {key} must be finite, got {value}"
            )));
        }

        Ok(Self { owner, values })
    }

    /// Value of a key that `validate` guaranteed to be present.
    pub(crate) fn get(&self, key: &str) -> Result<f64, LampError> {
        self.values
            .get(key)
            .copied()
            .ok_or_else(|| LampError::config(format!("{}: missing parameter {key}", self.owner)))
    }

    pub(crate) fn get_or(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).copied().unwrap_or(default)
    }

    /// Value of `key` that must be strictly positive.
    pub(crate) fn positive(&self, key: &str) -> Result<f64, LampError> {
        let value = self.get(key)?;
        if value > 0.0 {
            Ok(value)
        } else {
            Err(LampError::config(format!(
                "{}: {key} must be positive, got {value}",
                self.owner
            )))
        }
    }

    /// Value of `key` that must lie in `[min, max]`.
    pub(crate) fn in_range(&self, key: &str, min: f64, max: f64) -> Result<f64, LampError> {
        let value = self.get(key)?;
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(LampError::config(format!(
                "{}: {key} = {value} outside [{min}, {max}]",
                self.owner
            )))
        }
    }
}

/// Build a parameter map from `(key, value)` pairs.
pub fn param_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_unknown_keys() {
        let values = param_map(&[("theta_E", 1.0), ("size", 2.0)]);

        let err = ParamSet::validate("sis", &values, &["theta_E", "center_x"], &[]).unwrap_err();
        assert!(err.to_string().contains("center_x"));

        let err = ParamSet::validate("sis", &values, &["theta_E"], &["center_x"]).unwrap_err();
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn test_non_finite_rejected() {
        let values = param_map(&[("kappa", f64::NAN)]);
        assert!(matches!(
            ParamSet::validate("convergence", &values, &["kappa"], &[]),
            Err(LampError::Configuration(_))
        ));
    }

    #[test]
    fn test_defaults_and_ranges() {
        let values = param_map(&[("n", 7.0), ("half_light_radius", 0.5)]);
        let required = ["n", "half_light_radius"];
        let params = ParamSet::validate("sersic", &values, &required, &["flux"]).unwrap();

        assert_eq!(params.get_or("flux", 1.0), 1.0);
        assert_eq!(params.positive("half_light_radius").unwrap(), 0.5);
        assert!(params.in_range("n", 0.3, 6.2).is_err());
        assert!(params.in_range("n", 0.3, 7.0).is_ok());
    }
}
