// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed generation request parameters.
//!
//! Inbound requests carry a heterogeneous parameter list that must be
//! translated into the worker's argv. The closed variant set here makes
//! that translation total: every representable parameter has exactly one
//! argv rendering.
//!
//! Flattening contract (the worker script must match it):
//! - string parameter → one argv entry, the literal wrapped in double quotes
//! - numeric parameter → one argv entry, the raw textual form
//! - list parameter → each element becomes its own argv entry, rendered as
//!   raw JSON text (a nested list stays a single entry)

use serde::{Deserialize, Serialize};

/// One generation request parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationParam {
    /// A free-form string (prompt, style label, model name).
    Str(String),
    /// A number (dimension, seed, image count).
    Num(serde_json::Number),
    /// A list of parameters, flattened into individual argv entries.
    List(Vec<GenerationParam>),
}

impl From<&str> for GenerationParam {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for GenerationParam {
    fn from(value: i64) -> Self {
        Self::Num(value.into())
    }
}

/// Raw JSON text of a parameter, used for list elements.
fn raw_text(param: &GenerationParam) -> String {
    match param {
        GenerationParam::Str(s) => serde_json::Value::String(s.clone()).to_string(),
        GenerationParam::Num(n) => n.to_string(),
        GenerationParam::List(items) => {
            let elems: Vec<String> = items.iter().map(raw_text).collect();
            format!("[{}]", elems.join(","))
        }
    }
}

/// Flatten a parameter sequence into worker argv entries.
pub fn to_worker_args(params: &[GenerationParam]) -> Vec<String> {
    let mut args = Vec::new();
    for param in params {
        match param {
            GenerationParam::List(items) => {
                for item in items {
                    args.push(raw_text(item));
                }
            }
            other => args.push(raw_text(other)),
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_is_quoted() {
        let args = to_worker_args(&["a red fox".into()]);
        assert_eq!(args, vec![r#""a red fox""#]);
    }

    #[test]
    fn string_quotes_are_escaped() {
        let args = to_worker_args(&[r#"say "hi""#.into()]);
        assert_eq!(args, vec![r#""say \"hi\"""#]);
    }

    #[test]
    fn number_passes_through_raw() {
        let half = serde_json::Number::from_f64(1.5).unwrap();
        let args = to_worker_args(&[512.into(), GenerationParam::Num(half)]);
        assert_eq!(args, vec!["512", "1.5"]);
    }

    #[test]
    fn list_elements_become_individual_args() {
        let params = vec![
            GenerationParam::Str("prompt".into()),
            GenerationParam::List(vec![256.into(), 384.into()]),
            GenerationParam::Num(7.into()),
        ];
        assert_eq!(
            to_worker_args(&params),
            vec![r#""prompt""#, "256", "384", "7"]
        );
    }

    #[test]
    fn list_string_element_keeps_raw_json_form() {
        let params = vec![GenerationParam::List(vec!["hassaku".into(), 42.into()])];
        assert_eq!(to_worker_args(&params), vec![r#""hassaku""#, "42"]);
    }

    #[test]
    fn nested_list_stays_one_arg() {
        let params = vec![GenerationParam::List(vec![GenerationParam::List(vec![
            1.into(),
            2.into(),
        ])])];
        assert_eq!(to_worker_args(&params), vec!["[1,2]"]);
    }

    #[test]
    fn empty_params_yield_no_args() {
        assert!(to_worker_args(&[]).is_empty());
    }

    #[test]
    fn params_deserialize_from_request_payload() {
        let json = r#"["a castle", 512, [256, 384], 3]"#;
        let params: Vec<GenerationParam> = serde_json::from_str(json).unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(
            to_worker_args(&params),
            vec![r#""a castle""#, "512", "256", "384", "3"]
        );
    }
}
