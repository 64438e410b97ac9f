//! Literal and identifier formatting shared by every block.

/// Formats a literal value with the shortest representation that keeps a decimal point,
/// `0.2` stays `0.2` and `1` becomes `1.0`.
pub fn emit_float(value: f32) -> String {
    if !value.is_finite() {
        return "0.0".to_owned();
    }

    let text = value.to_string();
    if text.contains('.') || text.contains('e') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Formats a block configuration value with a fixed six digit precision.
pub fn write_float(value: f32) -> String {
    if !value.is_finite() {
        return write_float(0.0);
    }
    format!("{value:.6}")
}

/// Keeps only ASCII letters and underscores.
pub fn sanitize_identifier(prefix: &str) -> String {
    prefix
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '_')
        .collect()
}

/// Opens a preprocessor guard: `!NAME` is negated, expressions use `#if`.
pub fn define_guard(define: &str, not_define: bool) -> String {
    if let Some(name) = define.strip_prefix('!') {
        format!("#ifndef {name}\n")
    } else if define.contains(['(', ' ', '>', '<', '=']) {
        if not_define {
            format!("#if !({define})\n")
        } else {
            format!("#if {define}\n")
        }
    } else if not_define {
        format!("#ifndef {define}\n")
    } else {
        format!("#ifdef {define}\n")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_emit_float_keeps_decimal_point() {
        assert_eq!(emit_float(0.2), "0.2");
        assert_eq!(emit_float(1.0), "1.0");
        assert_eq!(emit_float(-3.0), "-3.0");
        assert_eq!(emit_float(0.0), "0.0");
    }

    #[test]
    fn test_write_float_fixed_precision() {
        assert_eq!(write_float(-1.0), "-1.000000");
        assert_eq!(write_float(0.0), "0.000000");
        assert_eq!(write_float(0.5), "0.500000");
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("u_World View"), "u_WorldView");
        assert_eq!(sanitize_identifier("uv2"), "uv");
        assert_eq!(sanitize_identifier("123"), "");
    }

    #[test]
    fn test_define_guard() {
        assert_eq!(define_guard("UV1", false), "#ifdef UV1\n");
        assert_eq!(define_guard("UV1", true), "#ifndef UV1\n");
        assert_eq!(define_guard("!UV1", false), "#ifndef UV1\n");
        assert_eq!(
            define_guard("NUM_BONE_INFLUENCERS > 0", false),
            "#if NUM_BONE_INFLUENCERS > 0\n"
        );
    }

    mod properties {
        use proptest::prelude::*;

        use super::super::*;

        proptest! {
            #[test]
            fn emitted_float_parses_back(value in -1.0e6f32..1.0e6f32) {
                let text = emit_float(value);
                prop_assert!(text.contains('.') || text.contains('e'));
                prop_assert_eq!(text.parse::<f32>().unwrap(), value);
            }

            #[test]
            fn written_float_has_six_decimals(value in -1.0e6f32..1.0e6f32) {
                let text = write_float(value);
                let decimals = text.split('.').nth(1).unwrap();
                prop_assert_eq!(decimals.len(), 6);
            }
        }
    }
}
