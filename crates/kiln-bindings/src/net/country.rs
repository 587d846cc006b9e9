//! Country names by ISO 3166-1 alpha-2 code

/// (code, English, German)
const COUNTRIES: &[(&str, &str, &str)] = &[
    ("AR", "Argentina", "Argentinien"),
    ("AT", "Austria", "Österreich"),
    ("AU", "Australia", "Australien"),
    ("BE", "Belgium", "Belgien"),
    ("BR", "Brazil", "Brasilien"),
    ("CA", "Canada", "Kanada"),
    ("CH", "Switzerland", "Schweiz"),
    ("CN", "China", "China"),
    ("CZ", "Czechia", "Tschechien"),
    ("DE", "Germany", "Deutschland"),
    ("DK", "Denmark", "Dänemark"),
    ("ES", "Spain", "Spanien"),
    ("FI", "Finland", "Finnland"),
    ("FR", "France", "Frankreich"),
    ("GB", "United Kingdom", "Vereinigtes Königreich"),
    ("GR", "Greece", "Griechenland"),
    ("IE", "Ireland", "Irland"),
    ("IN", "India", "Indien"),
    ("IT", "Italy", "Italien"),
    ("JP", "Japan", "Japan"),
    ("KR", "South Korea", "Südkorea"),
    ("MX", "Mexico", "Mexiko"),
    ("NL", "Netherlands", "Niederlande"),
    ("NO", "Norway", "Norwegen"),
    ("NZ", "New Zealand", "Neuseeland"),
    ("PL", "Poland", "Polen"),
    ("PT", "Portugal", "Portugal"),
    ("RU", "Russia", "Russland"),
    ("SE", "Sweden", "Schweden"),
    ("TR", "Turkey", "Türkei"),
    ("UA", "Ukraine", "Ukraine"),
    ("US", "United States", "Vereinigte Staaten"),
    ("ZA", "South Africa", "Südafrika"),
];

/// Name of the country with `code` in `lang` ("EN" or "DE", case-insensitive).
///
/// Unsupported languages fall back to English. Unknown codes have no name.
pub fn country_name(code: &str, lang: &str) -> Option<&'static str> {
    let (_, en, de) = COUNTRIES
        .iter()
        .find(|(c, _, _)| c.eq_ignore_ascii_case(code))?;
    Some(if lang.eq_ignore_ascii_case("de") { *de } else { *en })
}
