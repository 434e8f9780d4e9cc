use geo::MultiPolygon;

/// One row of a station or resident table after column selection.
/// Coordinates stay as text with a decimal point.
#[derive(Debug, Clone, PartialEq)]
pub struct PostalRecord {
    pub postal_code: u32,
    pub region: Option<String>,
    pub latitude: String,
    pub longitude: String,
    // Rated power in kW for stations, resident count for residents
    pub attribute_value: Option<f64>,
}

impl PostalRecord {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.latitude.trim().parse().ok()?;
        let lon = self.longitude.trim().parse().ok()?;
        Some((lat, lon))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub postal_code: u32,
    pub wkt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialRecord {
    pub record: PostalRecord,
    pub geometry: MultiPolygon<f64>,
}

impl SpatialRecord {
    pub fn postal_code(&self) -> u32 {
        self.record.postal_code
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedCount {
    pub postal_code: u32,
    pub count: u32,
    pub geometry: MultiPolygon<f64>,
}

/// Exclusive postal-code interval: `lower < plz < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct PostalRange {
    pub lower: u32,
    pub upper: u32,
}

impl PostalRange {
    pub const fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, postal_code: u32) -> bool {
        postal_code > self.lower && postal_code < self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_exclusive() {
        let range = PostalRange::new(10115, 14200);
        assert!(!range.contains(10115));
        assert!(range.contains(10116));
        assert!(range.contains(14199));
        assert!(!range.contains(14200));
    }

    #[test]
    fn coordinates_parse_normalized_text() {
        let record = PostalRecord {
            postal_code: 10117,
            region: None,
            latitude: "52.5163".to_string(),
            longitude: "13.3777".to_string(),
            attribute_value: None,
        };
        assert_eq!(record.coordinates(), Some((52.5163, 13.3777)));
    }
}
