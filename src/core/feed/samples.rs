use super::parser::parse_trends;
use super::types::{Geo, TrendItem};

const SAMPLE_BD: &str = include_str!("../../../fixtures/samples/trends-bd.xml");
const SAMPLE_GB: &str = include_str!("../../../fixtures/samples/trends-gb.xml");

/// Raw bundled document shown when no live feed can be reached.
pub fn sample_document(geo: Geo) -> &'static str {
    match geo {
        Geo::Bangladesh => SAMPLE_BD,
        Geo::UnitedKingdom => SAMPLE_GB,
    }
}

pub fn sample_trends(geo: Geo) -> Vec<TrendItem> {
    parse_trends(sample_document(geo))
}
