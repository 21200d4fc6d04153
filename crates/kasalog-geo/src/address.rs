//! Nominatim response model and address formatting.
//!
//! Formatting appends whatever the provider returned, from the widest area to
//! the narrowest: state, municipality (city, town or village), suburb,
//! quarter or neighbourhood, then road with its house number. When none of
//! those are present the first comma-separated segment of `display_name` is
//! used instead.

use serde::Deserialize;

use kasalog_core::Address;

/// Structured address breakdown returned with `addressdetails=1`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimAddress {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub neighbourhood: Option<String>,
    #[serde(default)]
    pub road: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
}

/// Body of a `/reverse?format=json` response.
///
/// Unknown fields (`lat`, `osm_id`, `boundingbox`, ...) are ignored, and an
/// `{"error": "..."}` body simply has no `display_name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReverseResponse {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<NominatimAddress>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Build a display address from the structured fields.
///
/// Returns `None` when no usable field is present.
pub fn format_address(address: &NominatimAddress, separator: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(state) = present(&address.state) {
        parts.push(state.to_string());
    }
    if let Some(municipality) = present(&address.city)
        .or_else(|| present(&address.town))
        .or_else(|| present(&address.village))
    {
        parts.push(municipality.to_string());
    }
    if let Some(suburb) = present(&address.suburb) {
        parts.push(suburb.to_string());
    }
    if let Some(area) = present(&address.quarter).or_else(|| present(&address.neighbourhood)) {
        parts.push(area.to_string());
    }
    match (present(&address.road), present(&address.house_number)) {
        (Some(road), Some(number)) => parts.push(format!("{road}{number}")),
        (Some(road), None) => parts.push(road.to_string()),
        // A house number without a road says nothing useful.
        (None, _) => {}
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(separator))
    }
}

/// Classify a successful lookup response.
pub fn address_from_response(response: &ReverseResponse, separator: &str) -> Address {
    let Some(display_name) = present(&response.display_name) else {
        return Address::NoData;
    };

    if let Some(formatted) = response
        .address
        .as_ref()
        .and_then(|a| format_address(a, separator))
    {
        return Address::Resolved(formatted);
    }

    match display_name.split(',').next().map(str::trim) {
        Some(first) if !first.is_empty() => Address::Resolved(first.to_string()),
        _ => Address::NoData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ReverseResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_full_japanese_address() {
        let resp = parse(
            r#"{
                "display_name": "1, 丸の内一丁目, 千代田区, 東京都, 100-0005, 日本",
                "address": {
                    "state": "東京都",
                    "city": "千代田区",
                    "suburb": "丸の内",
                    "quarter": "丸の内一丁目",
                    "road": "丸の内仲通り",
                    "house_number": "1",
                    "country": "日本"
                }
            }"#,
        );
        assert_eq!(
            address_from_response(&resp, ""),
            Address::Resolved("東京都千代田区丸の内丸の内一丁目丸の内仲通り1".to_string())
        );
    }

    #[test]
    fn test_city_preferred_over_town_and_village() {
        let address = NominatimAddress {
            city: Some("City".into()),
            town: Some("Town".into()),
            village: Some("Village".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&address, " ").as_deref(), Some("City"));

        let address = NominatimAddress {
            town: Some("Town".into()),
            village: Some("Village".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&address, " ").as_deref(), Some("Town"));
    }

    #[test]
    fn test_quarter_preferred_over_neighbourhood() {
        let address = NominatimAddress {
            quarter: Some("Quarter".into()),
            neighbourhood: Some("Hood".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&address, "").as_deref(), Some("Quarter"));

        let address = NominatimAddress {
            neighbourhood: Some("Hood".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&address, "").as_deref(), Some("Hood"));
    }

    #[test]
    fn test_house_number_needs_road() {
        let address = NominatimAddress {
            state: Some("Kanagawa".into()),
            house_number: Some("12".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&address, ", ").as_deref(), Some("Kanagawa"));

        let address = NominatimAddress {
            road: Some("Main Street".into()),
            ..Default::default()
        };
        assert_eq!(
            format_address(&address, ", ").as_deref(),
            Some("Main Street")
        );
    }

    #[test]
    fn test_separator_is_applied() {
        let address = NominatimAddress {
            state: Some("Osaka".into()),
            city: Some("Osaka".into()),
            suburb: Some("Kita".into()),
            ..Default::default()
        };
        assert_eq!(
            format_address(&address, ", ").as_deref(),
            Some("Osaka, Osaka, Kita")
        );
    }

    #[test]
    fn test_blank_fields_are_ignored() {
        let address = NominatimAddress {
            state: Some("  ".into()),
            city: Some(String::new()),
            town: Some("Hakone".into()),
            ..Default::default()
        };
        assert_eq!(format_address(&address, "").as_deref(), Some("Hakone"));
    }

    #[test]
    fn test_falls_back_to_display_name_segment() {
        let resp = parse(r#"{"display_name": "Pacific Ocean, Somewhere", "address": {"country": "JP"}}"#);
        assert_eq!(
            address_from_response(&resp, ""),
            Address::Resolved("Pacific Ocean".to_string())
        );

        let resp = parse(r#"{"display_name": "Lonely Rock"}"#);
        assert_eq!(
            address_from_response(&resp, ""),
            Address::Resolved("Lonely Rock".to_string())
        );
    }

    #[test]
    fn test_missing_display_name_is_no_data() {
        let resp = parse(r#"{"error": "Unable to geocode"}"#);
        assert_eq!(address_from_response(&resp, ""), Address::NoData);

        // Structured fields alone are not trusted without a display name.
        let resp = parse(r#"{"address": {"city": "Kyoto"}}"#);
        assert_eq!(address_from_response(&resp, ""), Address::NoData);

        let resp = parse(r#"{"display_name": ""}"#);
        assert_eq!(address_from_response(&resp, ""), Address::NoData);
    }
}
