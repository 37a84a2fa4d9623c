//! C3 — the per-resource numeric transform engine.
//!
//! Pure and synchronous: no I/O, no registry access, nothing async.
//! Kept that way deliberately so it's exhaustively unit-testable on
//! its own, the same discipline the teacher applies to its own
//! dependency-free value-conversion module.
//!
//! Operation order is normative, per spec.md §4.2:
//!
//! Outgoing (device -> platform): mask, shift, base, scale, offset,
//! assertion, mappings.
//!
//! Incoming (platform -> device): the exact inverse, in reverse order,
//! *excluding* assertion and mappings, which belong to the dispatch
//! pipeline's parse/coercion stage (see `dispatcher::coerce_incoming`)
//! rather than the numeric engine.

use adapter_api::{Error, PropertyValue, ResourceOperation, Result, Value};

/// Applies the forward (device -> platform) transform chain to a
/// freshly-read driver value. `mappings` coming back non-empty and
/// matching the value's string form overrides the final `Value` with
/// a `Value::String` of the mapped name (an enumeration remap).
pub fn apply_outgoing(value: &Value, prop: &PropertyValue, op: &ResourceOperation) -> Result<Value> {
    let mut v = value.clone();

    if let Some(mask) = prop.mask {
        v = apply_mask(&v, mask as i128);
    }

    if let Some(shift) = prop.shift {
        v = apply_shift(&v, shift);
    }

    // base/scale/offset are inherently floating-point operations: once
    // any of them fires, the result is reported as a `Float64` even if
    // the resource's declared type is integral (e.g. a scale of 0.1 on
    // an Int16 resource reports "50.0", not a truncated "50").
    let mut rescaled = false;
    let mut fv = v.as_f64();

    if let Some(base) = prop.base {
        if base != 0.0 {
            if let Some(x) = fv {
                fv = Some(base.powf(x));
                rescaled = true;
            }
        }
    }

    if let Some(scale) = prop.scale {
        if scale != 1.0 {
            if let Some(x) = fv {
                fv = Some(x * scale);
                rescaled = true;
            }
        }
    }

    if let Some(offset) = prop.offset {
        if offset != 0.0 {
            if let Some(x) = fv {
                fv = Some(x + offset);
                rescaled = true;
            }
        }
    }

    if rescaled {
        v = Value::Float64(fv.unwrap());
    }

    if let Some(assertion) = &prop.assertion {
        let rendered = v.to_string();
        if &rendered != assertion {
            return Err(Error::AssertionFailed(format!(
                "expected '{}', got '{}'",
                assertion, rendered
            )));
        }
    }

    if !op.mappings.is_empty() {
        let rendered = v.to_string();
        if let Some(mapped) = op.mappings.get(&rendered) {
            v = Value::String(mapped.clone());
        }
    }

    Ok(v)
}

/// Applies the inverse (platform -> device) numeric transform chain.
/// Assumes `value` has already been coerced to the resource's declared
/// type and range-checked; mapping reversal (enumeration name back to
/// underlying value) happens before this, in
/// [`reverse_mapping`], because it must run before type coercion.
///
/// Mask has no meaningful inverse -- the forward mask already
/// discarded information -- so it is intentionally skipped here,
/// matching spec.md §4.2's framing of mask/shift as a one-way
/// transform on the read path.
pub fn apply_incoming(value: Value, prop: &PropertyValue) -> Value {
    let mut v = value;

    if let Some(offset) = prop.offset {
        if offset != 0.0 {
            if let Some(fv) = v.as_f64() {
                v = v.from_f64_like(fv - offset);
            }
        }
    }

    if let Some(scale) = prop.scale {
        if scale != 1.0 && scale != 0.0 {
            if let Some(fv) = v.as_f64() {
                v = v.from_f64_like(fv / scale);
            }
        }
    }

    if let Some(base) = prop.base {
        if base > 0.0 && base != 1.0 {
            if let Some(fv) = v.as_f64() {
                if fv > 0.0 {
                    v = v.from_f64_like(fv.ln() / base.ln());
                }
            }
        }
    }

    if let Some(shift) = prop.shift {
        v = apply_shift(&v, -shift);
    }

    v
}

/// Reverses a `ResourceOperation.mappings` enumeration remap: if `raw`
/// matches one of the mapping's *values*, returns the corresponding
/// key (the underlying numeric string); otherwise returns `raw`
/// unchanged. Must run before the target resource's string is parsed
/// into a typed `Value`.
pub fn reverse_mapping<'a>(raw: &'a str, op: &'a ResourceOperation) -> &'a str {
    op.mappings
        .iter()
        .find(|(_, v)| v.as_str() == raw)
        .map(|(k, _)| k.as_str())
        .unwrap_or(raw)
}

fn apply_mask(value: &Value, mask: i128) -> Value {
    if !value.is_integral() {
        return value.clone();
    }

    match value.as_i128() {
        Some(iv) => value.from_i128_like(iv & mask),
        None => value.clone(),
    }
}

/// `shift` > 0 means "shift right" (the forward direction); negative
/// means "shift left". Widening to `i128` before shifting makes the
/// signed/unsigned distinction spec.md §4.2 calls out automatic: an
/// unsigned value widens to a non-negative `i128`, so an arithmetic
/// shift on it behaves identically to a logical shift; a signed value
/// widens with sign extension, so the same arithmetic shift is exactly
/// the signed behavior the spec asks for.
fn apply_shift(value: &Value, shift: i32) -> Value {
    if !value.is_integral() || shift == 0 {
        return value.clone();
    }

    match value.as_i128() {
        Some(iv) => {
            let shifted = if shift > 0 {
                iv >> shift
            } else {
                iv << (-shift)
            };
            value.from_i128_like(shifted)
        }
        None => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_api::PropertyValue;
    use std::collections::HashMap;

    fn prop(scale: Option<f64>, offset: Option<f64>) -> PropertyValue {
        PropertyValue {
            value_type: "Int16".into(),
            scale,
            offset,
            ..Default::default()
        }
    }

    fn op() -> ResourceOperation {
        ResourceOperation {
            index: 0,
            object: "temperature".into(),
            mappings: HashMap::new(),
            ..Default::default()
        }
    }

    #[test]
    fn scale_and_offset_scenario_from_spec() {
        // int16=500, scale=0.1, offset=0 -> reported as the float "50.0",
        // not truncated back to an Int16.
        let p = prop(Some(0.1), Some(0.0));
        let out = apply_outgoing(&Value::Int16(500), &p, &op()).unwrap();
        assert_eq!(out, Value::Float64(50.0));
        assert_eq!(out.to_string(), "50.0");
    }

    #[test]
    fn disabled_transform_leaves_value_untouched() {
        // Scenario 2: dataTransform=false means the dispatcher simply
        // never calls apply_outgoing; verify the untouched value here.
        assert_eq!(Value::Int16(500).to_string(), "500");
    }

    #[test]
    fn outgoing_then_incoming_recovers_original_value() {
        let p = PropertyValue {
            value_type: "Float64".into(),
            scale: Some(2.5),
            offset: Some(10.0),
            base: Some(2.0),
            ..Default::default()
        };
        let original = Value::Float64(3.0);

        let forward = apply_outgoing(&original, &p, &op()).unwrap();
        let back = apply_incoming(forward, &p);

        let orig = original.as_f64().unwrap();
        let recovered = back.as_f64().unwrap();
        assert!((orig - recovered).abs() < 1e-9 * orig.abs().max(1.0));
    }

    #[test]
    fn mask_and_shift_are_noops_on_floats() {
        let p = PropertyValue {
            value_type: "Float32".into(),
            mask: Some(0x0f),
            shift: Some(2),
            ..Default::default()
        };
        let out = apply_outgoing(&Value::Float32(12.5), &p, &op()).unwrap();
        assert_eq!(out, Value::Float32(12.5));
    }

    #[test]
    fn mask_then_shift_on_integral() {
        let p = PropertyValue {
            value_type: "UInt16".into(),
            mask: Some(0xff),
            shift: Some(4),
            ..Default::default()
        };
        // 0x1f4 & 0xff = 0xf4 (244); 244 >> 4 = 15.
        let out = apply_outgoing(&Value::UInt16(0x1f4), &p, &op()).unwrap();
        assert_eq!(out, Value::UInt16(15));
    }

    #[test]
    fn assertion_mismatch_fails() {
        let p = PropertyValue {
            value_type: "Bool".into(),
            assertion: Some("true".into()),
            ..Default::default()
        };
        let err = apply_outgoing(&Value::Bool(false), &p, &op()).unwrap_err();
        assert!(matches!(err, Error::AssertionFailed(_)));
    }

    #[test]
    fn mapping_remaps_string_form() {
        let mut mappings = HashMap::new();
        mappings.insert("0".to_string(), "closed".to_string());
        mappings.insert("1".to_string(), "open".to_string());

        let o = ResourceOperation {
            index: 0,
            object: "valve".into(),
            mappings,
            ..Default::default()
        };

        let out = apply_outgoing(&Value::UInt8(1), &PropertyValue::default(), &o).unwrap();
        assert_eq!(out, Value::String("open".into()));
    }

    #[test]
    fn reverse_mapping_finds_key_for_enum_name() {
        let mut mappings = HashMap::new();
        mappings.insert("0".to_string(), "closed".to_string());
        mappings.insert("1".to_string(), "open".to_string());

        let o = ResourceOperation {
            index: 0,
            object: "valve".into(),
            mappings,
            ..Default::default()
        };

        assert_eq!(reverse_mapping("open", &o), "1");
        assert_eq!(reverse_mapping("unmapped", &o), "unmapped");
    }
}
