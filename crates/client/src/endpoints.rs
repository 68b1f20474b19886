//! Typed endpoint families for the operations dashboard.
//!
//! Each family pairs a path with an explicit params struct and the cache
//! lifetime its data warrants.

use serde::Serialize;

use opsdash_core::{Error, QueryDescriptor, TtlClass};

/// A family of queries sharing one endpoint and one params shape.
pub trait EndpointFamily {
    const PATH: &'static str;
    const TTL_CLASS: TtlClass;
    /// Params the server rejects a request without.
    const REQUIRED: &'static [&'static str] = &[];
    type Params: Serialize + Clone + PartialEq + Send + Sync + 'static;

    fn descriptor(params: &Self::Params) -> Result<QueryDescriptor, Error> {
        QueryDescriptor::from_params(Self::PATH, params)
    }
}

/// Base / cities / free-text filter shared by the metric and driver views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl FilterParams {
    pub fn for_base(base: impl Into<String>) -> Self {
        Self { base: Some(base.into()), ..Default::default() }
    }

    pub fn with_cities<I, S>(mut self, cities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cities = cities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the search text; blank text clears it.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = if trimmed.is_empty() { None } else { Some(trimmed.to_string()) };
        self
    }
}

/// Filter for reference lists scoped to a base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaseParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

/// SLA metrics for the selected base and cities.
pub struct SlaMetrics;

impl EndpointFamily for SlaMetrics {
    const PATH: &'static str = "/api/metrics/sla";
    const TTL_CLASS: TtlClass = TtlClass::Short;
    const REQUIRED: &'static [&'static str] = &["base"];
    type Params = FilterParams;
}

/// Drivers matching the current filter.
pub struct DriverList;

impl EndpointFamily for DriverList {
    const PATH: &'static str = "/api/drivers";
    const TTL_CLASS: TtlClass = TtlClass::Short;
    const REQUIRED: &'static [&'static str] = &["base"];
    type Params = FilterParams;
}

/// City names available for a base.
pub struct CityList;

impl EndpointFamily for CityList {
    const PATH: &'static str = "/api/cities";
    const TTL_CLASS: TtlClass = TtlClass::Long;
    const REQUIRED: &'static [&'static str] = &["base"];
    type Params = BaseParams;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_search_is_absent() {
        let params = FilterParams::for_base("X").with_search("   ");
        assert_eq!(params.search, None);
        assert_eq!(FilterParams::for_base("X").with_search(" ana ").search.as_deref(), Some("ana"));
    }

    #[test]
    fn test_city_order_does_not_change_key() {
        let a = SlaMetrics::descriptor(&FilterParams::for_base("X").with_cities(["Lima", "Cusco"])).unwrap();
        let b = SlaMetrics::descriptor(&FilterParams::for_base("X").with_cities(["Cusco", "Lima"])).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_families_use_distinct_keys() {
        let params = FilterParams::for_base("X");
        let metrics = SlaMetrics::descriptor(&params).unwrap().cache_key();
        let drivers = DriverList::descriptor(&params).unwrap().cache_key();
        assert_ne!(metrics, drivers);
        assert_eq!(drivers.endpoint(), "/api/drivers");
    }

    #[test]
    fn test_no_filter_is_blank() {
        assert!(SlaMetrics::descriptor(&FilterParams::default()).unwrap().is_blank());
        assert!(CityList::descriptor(&BaseParams::default()).unwrap().is_blank());
        assert!(!CityList::descriptor(&BaseParams { base: Some("X".into()) }).unwrap().is_blank());
    }

    #[test]
    fn test_cities_without_base_lack_required_filter() {
        let descriptor = SlaMetrics::descriptor(&FilterParams::default().with_cities(["Lima"])).unwrap();
        assert!(!descriptor.is_blank());
        assert!(descriptor.lacks_any(SlaMetrics::REQUIRED));
        assert!(!SlaMetrics::descriptor(&FilterParams::for_base("X")).unwrap().lacks_any(SlaMetrics::REQUIRED));
    }

    #[test]
    fn test_ttl_classes() {
        assert_eq!(SlaMetrics::TTL_CLASS, TtlClass::Short);
        assert_eq!(CityList::TTL_CLASS, TtlClass::Long);
    }
}
