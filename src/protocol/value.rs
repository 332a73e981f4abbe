use tracing::debug;

/// Payload of a [`Value`]: the active wire type and its data in one place.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    Str(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

/// One named, typed scalar of a wire schema.
///
/// The name is fixed at construction; the payload may be replaced, which
/// also switches the active type. Values created on the fly for wire keys
/// the schema did not declare carry the `generated` flag so a reset can
/// purge them again.
#[derive(Debug, Clone)]
pub struct Value {
    name: String,
    data: ValueData,
    generated: bool,
}

impl Value {
    pub fn str(name: &str, data: &str) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Str(data.to_string()),
            generated: false,
        }
    }

    pub fn unsigned(name: &str, data: u64) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Unsigned(data),
            generated: false,
        }
    }

    pub fn signed(name: &str, data: i64) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Signed(data),
            generated: false,
        }
    }

    pub fn float(name: &str, data: f64) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Float(data),
            generated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub(crate) fn mark_generated(&mut self) {
        self.generated = true;
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ValueData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.data {
            ValueData::Unsigned(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            ValueData::Signed(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.data {
            ValueData::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn set_str(&mut self, data: &str) {
        self.data = ValueData::Str(data.to_string());
    }

    pub fn set_u64(&mut self, data: u64) {
        self.data = ValueData::Unsigned(data);
    }

    pub fn set_i64(&mut self, data: i64) {
        self.data = ValueData::Signed(data);
    }

    pub fn set_f64(&mut self, data: f64) {
        self.data = ValueData::Float(data);
    }

    /// Parse a raw wire span into the declared type.
    ///
    /// Numeric parse failures keep the previous payload and are reported at
    /// debug level only; the venue occasionally pads numeric fields with
    /// placeholders and a stale value is preferable to losing the frame.
    pub fn set_from_str(&mut self, raw: &str) {
        match &mut self.data {
            ValueData::Str(s) => {
                s.clear();
                s.push_str(raw);
            }
            ValueData::Unsigned(u) => match raw.parse::<u64>() {
                Ok(parsed) => *u = parsed,
                Err(e) => debug!(name = %self.name, raw, "unparseable unsigned field kept: {e}"),
            },
            ValueData::Signed(s) => match raw.parse::<i64>() {
                Ok(parsed) => *s = parsed,
                Err(e) => debug!(name = %self.name, raw, "unparseable signed field kept: {e}"),
            },
            ValueData::Float(f) => match raw.parse::<f64>() {
                Ok(parsed) => *f = parsed,
                Err(e) => debug!(name = %self.name, raw, "unparseable float field kept: {e}"),
            },
        }
    }

    /// Zero the payload, keeping the declared type.
    pub fn clear(&mut self) {
        match &mut self.data {
            ValueData::Str(s) => s.clear(),
            ValueData::Unsigned(u) => *u = 0,
            ValueData::Signed(s) => *s = 0,
            ValueData::Float(f) => *f = 0.0,
        }
    }
}
