use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Unique, stable identifier for a site (land parcel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(pub u64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical column names exposed by a normalized site table
pub mod columns {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const ADDRESS: &str = "address";
    pub const LON: &str = "lon";
    pub const LAT: &str = "lat";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const DESC: &str = "desc";
    pub const CONTEXT: &str = "context";

    pub const PARCEL_LOCATION: &str = "parcel_location";
    pub const LAND_USE: &str = "land_use";
    pub const AREA_M2: &str = "area_m2";
    pub const LISTING_PRICE: &str = "listing_price";
    pub const PRICE_PER_M2: &str = "price_per_m2";
    pub const TRAFFIC_SCORE: &str = "traffic_score";

    pub const SUBWAY_COUNT: &str = "subway_count_1500m";
    pub const SUBWAY_NEAREST: &str = "subway_nearest_m";
    pub const BUS_COUNT: &str = "bus_count_500m";
    pub const BUS_NEAREST: &str = "bus_nearest_m";
    pub const TRAIN_COUNT: &str = "train_count_3km";
    pub const TRAIN_NEAREST: &str = "train_nearest_m";
    pub const PARKING_COUNT: &str = "parking_count_1km";
    pub const PARKING_NEAREST: &str = "parking_nearest_m";

    /// Columns every normalized table carries, in table order
    pub const BUILTIN: [&str; 9] = [ID, NAME, ADDRESS, LON, LAT, X, Y, DESC, CONTEXT];
}

/// A single site record.
///
/// Built-in attributes are typed fields; every other source column is kept in
/// `attributes` under its canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub address: String,

    /// WGS 84 longitude
    pub lon: f64,

    /// WGS 84 latitude
    pub lat: f64,

    /// Projected easting in meters
    pub x: f64,

    /// Projected northing in meters
    pub y: f64,

    pub desc: String,

    /// Free text used for embedding
    pub context: String,

    pub attributes: BTreeMap<String, Value>,
}

impl Site {
    /// Look up a column value, built-in fields included
    pub fn value(&self, column: &str) -> Option<Value> {
        match column {
            columns::ID => Some(Value::from(self.id.0)),
            columns::NAME => Some(Value::from(self.name.clone())),
            columns::ADDRESS => Some(Value::from(self.address.clone())),
            columns::LON => Some(Value::from(self.lon)),
            columns::LAT => Some(Value::from(self.lat)),
            columns::X => Some(Value::from(self.x)),
            columns::Y => Some(Value::from(self.y)),
            columns::DESC => Some(Value::from(self.desc.clone())),
            columns::CONTEXT => Some(Value::from(self.context.clone())),
            other => self.attributes.get(other).cloned(),
        }
    }

    /// Column value rendered as text; missing and null cells are empty
    pub fn text(&self, column: &str) -> String {
        self.value(column).as_ref().map(cell_text).unwrap_or_default()
    }

    /// Column value coerced to a finite number
    pub fn number(&self, column: &str) -> Option<f64> {
        self.value(column).as_ref().and_then(cell_number)
    }

    pub fn traffic_score(&self) -> Option<f64> {
        self.number(columns::TRAFFIC_SCORE)
    }

    pub fn price_per_m2(&self) -> Option<f64> {
        self.number(columns::PRICE_PER_M2)
    }

    pub fn land_use(&self) -> String {
        self.text(columns::LAND_USE)
    }

    /// Text used to locate the site's district: parcel location, address, then name
    pub fn location_text(&self) -> String {
        let parcel = self.text(columns::PARCEL_LOCATION);
        if !parcel.trim().is_empty() {
            parcel
        } else if !self.address.trim().is_empty() {
            self.address.clone()
        } else {
            self.name.clone()
        }
    }
}

/// Render a cell as text the way tabular sources print it
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Coerce a cell to a number; unparsable cells are `None`
pub fn cell_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
