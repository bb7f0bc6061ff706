use std::fmt;

/// Numeric SenML value, keeping the precision it was produced with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SenmlNumber {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
}

impl SenmlNumber {
    pub fn as_f64(&self) -> f64 {
        match self {
            SenmlNumber::Integer(v) => *v as f64,
            SenmlNumber::Unsigned(v) => *v as f64,
            SenmlNumber::Float(v) => *v,
        }
    }

    /// Exact conversion to `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            SenmlNumber::Integer(v) => Some(*v),
            SenmlNumber::Unsigned(v) => i64::try_from(*v).ok(),
            SenmlNumber::Float(v) => {
                // 2^63 is the first float above i64::MAX
                let in_range = *v >= i64::MIN as f64 && *v < 9_223_372_036_854_775_808.0;
                (v.fract() == 0.0 && in_range).then_some(*v as i64)
            }
        }
    }

    /// Exact conversion to `u64`.
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            SenmlNumber::Integer(v) => u64::try_from(*v).ok(),
            SenmlNumber::Unsigned(v) => Some(*v),
            SenmlNumber::Float(v) => {
                let in_range = *v >= 0.0 && *v < 18_446_744_073_709_551_616.0;
                (v.fract() == 0.0 && in_range).then_some(*v as u64)
            }
        }
    }
}

impl fmt::Display for SenmlNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenmlNumber::Integer(v) => write!(f, "{}", v),
            SenmlNumber::Unsigned(v) => write!(f, "{}", v),
            SenmlNumber::Float(v) => write!(f, "{}", v),
        }
    }
}

/// The single value a record may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum SenmlValue {
    /// `vs`
    String(String),
    /// `v`
    Number(SenmlNumber),
    /// `vb`
    Boolean(bool),
    /// `vd`
    Opaque(Vec<u8>),
    /// `vlo`, formatted `objectId:instanceId`
    ObjectLink(String),
}

impl SenmlValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SenmlValue::String(_) => "vs",
            SenmlValue::Number(_) => "v",
            SenmlValue::Boolean(_) => "vb",
            SenmlValue::Opaque(_) => "vd",
            SenmlValue::ObjectLink(_) => "vlo",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenmlRecord {
    pub base_name: Option<String>,
    pub base_time: Option<f64>,
    pub name: Option<String>,
    pub time: Option<f64>,
    pub value: Option<SenmlValue>,
}

impl SenmlRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = Some(base_name.into());
        self
    }

    pub fn with_base_time(mut self, base_time: f64) -> Self {
        self.base_time = Some(base_time);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_value(mut self, value: SenmlValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// Ordered SenML records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenmlPack {
    pub records: Vec<SenmlRecord>,
}

impl SenmlPack {
    pub fn new(records: Vec<SenmlRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
