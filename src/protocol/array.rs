use crate::core::errors::PlatformError;
use crate::protocol::scan::Scanner;
use crate::protocol::value::{Value, ValueData};
use std::fmt::Write;
use tracing::debug;

/// Ordered, name-addressable collection of [`Value`]s.
///
/// Order is insertion order and is significant: positional wire arrays are
/// matched to entries by position, not by name. An array owns its values;
/// `add` consumes and `remove` hands ownership back.
#[derive(Debug, Default)]
pub struct ValueArray {
    items: Vec<Value>,
}

impl ValueArray {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a value. Callers declaring a schema must not add two live
    /// entries under the same name; lookups return the first match.
    pub fn add(&mut self, value: Value) {
        debug!(name = %value.name(), "add");
        self.items.push(value);
    }

    /// Remove the first entry with this name, returning it to the caller.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.items.iter().position(|va| va.name() == name)?;
        let value = self.items.remove(idx);
        debug!(name, "remove");
        Some(value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.iter().find(|va| va.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.items.iter_mut().find(|va| va.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    /// Fill entries from a `{ "name": value, ... }` frame.
    ///
    /// Known names are parsed into the entry's declared type; unknown names
    /// become new string entries marked generated, so the schema absorbs
    /// venue fields the application did not pre-declare. Numeric parse
    /// failures keep the stale payload (logged only); a scanner error is
    /// returned and stops the fill.
    pub fn fill_from_object(&mut self, text: &str) -> Result<(), PlatformError> {
        debug!("filling from object");
        let mut scan = Scanner::new(text);
        while let Some((name, value)) = scan.next_named()? {
            match self.get_mut(name) {
                Some(va) => va.set_from_str(value),
                None => {
                    let mut va = Value::str(name, "");
                    va.mark_generated();
                    va.set_from_str(value);
                    self.add(va);
                }
            }
        }
        Ok(())
    }

    /// Fill entries in declared order from a `[ v1, v2, ... ]` segment.
    ///
    /// Stops early when the input is exhausted. Returns the byte offset just
    /// past the closing `]` when one terminated the segment, so a caller can
    /// keep parsing sibling segments of a batched frame. Segments are
    /// expected to carry one value per schema entry: a shorter segment makes
    /// the scanner run past its `]` into the following separator, the fill
    /// comes back unterminated and any sibling segments are lost.
    pub fn fill_positional(&mut self, text: &str) -> Result<Option<usize>, PlatformError> {
        if self.is_empty() {
            return Err(PlatformError::InvalidArgument(
                "positional fill needs a declared schema".into(),
            ));
        }
        debug!("filling from positional segment");

        let mut scan = Scanner::new(text);
        for va in &mut self.items {
            match scan.next_positional()? {
                Some(value) => {
                    debug!(name = %va.name(), value, "  positional entry");
                    va.set_from_str(value);
                }
                None => break,
            }
        }

        let consumed = text.len() - scan.rest().len();
        if scan.rest().as_bytes().first() == Some(&b']') {
            Ok(Some(consumed + 1))
        } else {
            Ok(None)
        }
    }

    /// Remove generated entries, zero the rest.
    ///
    /// Declared entries keep their name and type so the schema is reusable
    /// across frames without reallocation.
    pub fn reset(&mut self) {
        debug!(items = self.items.len(), "reset");
        self.items.retain_mut(|va| {
            if va.is_generated() {
                false
            } else {
                va.clear();
                true
            }
        });
    }

    /// Render as `"name": value` pairs joined by commas, for outbound
    /// frames. Strings quoted, numbers bare decimal.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for (i, va) in self.items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = match va.data() {
                ValueData::Str(s) => write!(out, "\"{}\": \"{}\"", va.name(), s),
                ValueData::Unsigned(u) => write!(out, "\"{}\": {}", va.name(), u),
                ValueData::Signed(s) => write!(out, "\"{}\": {}", va.name(), s),
                ValueData::Float(f) => write!(out, "\"{}\": {}", va.name(), f),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_remove_restores_count() {
        let mut ar = ValueArray::with_capacity(4);
        ar.add(Value::str("a", "x"));
        let before = ar.len();
        ar.add(Value::unsigned("b", 1));
        let back = ar.remove("b").unwrap();
        assert_eq!(ar.len(), before);
        assert_eq!(back.as_u64(), Some(1));
        assert!(ar.remove("b").is_none());
    }

    #[test]
    fn test_fill_from_object_typed_and_generated() {
        let mut ar = ValueArray::new();
        ar.add(Value::unsigned("a", 0));
        ar.add(Value::str("b", ""));

        ar.fill_from_object(r#"{ "a": 1, "b": "x", "c": "extra" }"#).unwrap();

        assert_eq!(ar.get("a").unwrap().as_u64(), Some(1));
        assert_eq!(ar.get("b").unwrap().as_str(), Some("x"));
        let generated = ar.get("c").unwrap();
        assert!(generated.is_generated());
        assert_eq!(generated.as_str(), Some("extra"));
    }

    #[test]
    fn test_fill_from_object_tolerates_bad_number() {
        let mut ar = ValueArray::new();
        ar.add(Value::unsigned("a", 77));

        // not a returned error: the field keeps its previous payload
        ar.fill_from_object(r#"{ "a": "garbage" }"#).unwrap();
        assert_eq!(ar.get("a").unwrap().as_u64(), Some(77));
    }

    #[test]
    fn test_fill_positional_in_order() {
        let mut ar = ValueArray::new();
        ar.add(Value::unsigned("first", 0));
        ar.add(Value::unsigned("second", 0));
        ar.add(Value::float("third", 0.0));

        let next = ar.fill_positional("[1,2,3.5]").unwrap();
        assert_eq!(ar.get("first").unwrap().as_u64(), Some(1));
        assert_eq!(ar.get("second").unwrap().as_u64(), Some(2));
        assert_eq!(ar.get("third").unwrap().as_f64(), Some(3.5));
        assert_eq!(next, Some(9)); // offset just past the ']'
    }

    #[test]
    fn test_fill_positional_short_input_reports_bracket() {
        let mut ar = ValueArray::new();
        ar.add(Value::unsigned("a", 0));
        ar.add(Value::unsigned("b", 9));
        ar.add(Value::unsigned("c", 9));

        let next = ar.fill_positional("[5]").unwrap();
        assert_eq!(ar.get("a").unwrap().as_u64(), Some(5));
        // entries beyond the input keep their payload
        assert_eq!(ar.get("b").unwrap().as_u64(), Some(9));
        assert_eq!(next, Some(3));
    }

    #[test]
    fn test_fill_positional_undersized_segment_is_unterminated() {
        let mut ar = ValueArray::new();
        ar.add(Value::unsigned("a", 0));
        ar.add(Value::unsigned("b", 0));
        ar.add(Value::float("c", 2.5));

        // two values against a 3-entry schema: the scanner overruns the
        // segment's ']' and hands the separator to the last entry, which
        // keeps its stale payload
        let next = ar.fill_positional("[1,2],[4,5,6.5]]").unwrap();
        assert_eq!(next, None);
        assert_eq!(ar.get("a").unwrap().as_u64(), Some(1));
        assert_eq!(ar.get("b").unwrap().as_u64(), Some(2));
        assert_eq!(ar.get("c").unwrap().as_f64(), Some(2.5));
    }

    #[test]
    fn test_fill_positional_empty_schema_is_invalid() {
        let mut ar = ValueArray::new();
        assert!(ar.fill_positional("[1]").is_err());
    }

    #[test]
    fn test_reset_purges_generated_keeps_declared() {
        let mut ar = ValueArray::new();
        ar.add(Value::unsigned("declared", 3));
        let mut gen = Value::str("scratch", "x");
        gen.mark_generated();
        ar.add(gen);

        ar.reset();

        assert_eq!(ar.len(), 1);
        assert!(ar.get("scratch").is_none());
        assert_eq!(ar.get("declared").unwrap().as_u64(), Some(0));
    }

    #[test]
    fn test_to_wire_rendering() {
        let mut ar = ValueArray::new();
        ar.add(Value::str("channel", "ticker"));
        ar.add(Value::unsigned("cid", 123));
        ar.add(Value::signed("off", -1));
        assert_eq!(
            ar.to_wire(),
            r#""channel": "ticker", "cid": 123, "off": -1"#
        );
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut ar = ValueArray::new();
        ar.add(Value::str("symbol", "XRPUSD"));
        ar.add(Value::unsigned("cid", 55));

        let wire = format!("{{ {} }}", ar.to_wire());

        let mut back = ValueArray::new();
        back.add(Value::str("symbol", ""));
        back.add(Value::unsigned("cid", 0));
        back.fill_from_object(&wire).unwrap();

        assert_eq!(back.get("symbol").unwrap().as_str(), Some("XRPUSD"));
        assert_eq!(back.get("cid").unwrap().as_u64(), Some(55));
    }
}
