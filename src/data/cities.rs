//! Static city table for name-based queries
//!
//! Lets the CLI accept `--city Kraków` (or `krakow`, or `Krakow, Poland`)
//! instead of raw coordinates. Names are matched after folding case, Polish
//! diacritics and punctuation, so the user does not need the exact spelling.

/// A named place with coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    /// Local name of the city
    pub name: &'static str,
    /// Country, in English
    pub country: &'static str,
    /// Latitude coordinate
    pub latitude: f64,
    /// Longitude coordinate
    pub longitude: f64,
    /// Inhabitants, used to rank search results
    pub population: u32,
}

/// Static array of the built-in cities
pub static CITIES: [City; 17] = [
    City {
        name: "Warszawa",
        country: "Poland",
        latitude: 52.2297,
        longitude: 21.0122,
        population: 1_790_658,
    },
    City {
        name: "Kraków",
        country: "Poland",
        latitude: 50.0647,
        longitude: 19.9450,
        population: 779_115,
    },
    City {
        name: "Łódź",
        country: "Poland",
        latitude: 51.7592,
        longitude: 19.4550,
        population: 679_941,
    },
    City {
        name: "Wrocław",
        country: "Poland",
        latitude: 51.1079,
        longitude: 17.0385,
        population: 641_607,
    },
    City {
        name: "Poznań",
        country: "Poland",
        latitude: 52.4064,
        longitude: 16.9252,
        population: 540_372,
    },
    City {
        name: "Gdańsk",
        country: "Poland",
        latitude: 54.3520,
        longitude: 18.6466,
        population: 470_907,
    },
    City {
        name: "Szczecin",
        country: "Poland",
        latitude: 53.4285,
        longitude: 14.5528,
        population: 400_990,
    },
    City {
        name: "Bydgoszcz",
        country: "Poland",
        latitude: 53.1235,
        longitude: 18.0084,
        population: 346_739,
    },
    City {
        name: "Lublin",
        country: "Poland",
        latitude: 51.2465,
        longitude: 22.5684,
        population: 339_850,
    },
    City {
        name: "Białystok",
        country: "Poland",
        latitude: 53.1325,
        longitude: 23.1688,
        population: 297_554,
    },
    City {
        name: "Katowice",
        country: "Poland",
        latitude: 50.2649,
        longitude: 19.0238,
        population: 292_774,
    },
    City {
        name: "Berlin",
        country: "Germany",
        latitude: 52.5200,
        longitude: 13.4050,
        population: 3_644_826,
    },
    City {
        name: "Praha",
        country: "Czechia",
        latitude: 50.0755,
        longitude: 14.4378,
        population: 1_309_000,
    },
    City {
        name: "Wien",
        country: "Austria",
        latitude: 48.2082,
        longitude: 16.3738,
        population: 1_911_191,
    },
    City {
        name: "Vilnius",
        country: "Lithuania",
        latitude: 54.6872,
        longitude: 25.2797,
        population: 588_412,
    },
    City {
        name: "London",
        country: "United Kingdom",
        latitude: 51.5074,
        longitude: -0.1278,
        population: 8_982_000,
    },
    City {
        name: "Paris",
        country: "France",
        latitude: 48.8566,
        longitude: 2.3522,
        population: 2_161_000,
    },
];

/// Queries shorter than this (after normalizing) match nothing in [`search_cities`]
pub const MIN_QUERY_LEN: usize = 2;

/// Lowercases, folds Polish diacritics and drops everything but `[a-z0-9]`
pub fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'ą' => 'a',
            'ć' => 'c',
            'ę' => 'e',
            'ł' => 'l',
            'ń' => 'n',
            'ó' => 'o',
            'ś' => 's',
            'ź' | 'ż' => 'z',
            other => other,
        })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Finds a city by name, optionally followed by its country
///
/// # Example
///
/// ```
/// use weather_cache::data::cities::find_city;
///
/// let city = find_city("Krakow, Poland").expect("built-in city");
/// assert_eq!(city.name, "Kraków");
/// ```
pub fn find_city(name: &str) -> Option<&'static City> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    CITIES.iter().find(|city| {
        let city_name = normalize(city.name);
        wanted == city_name || wanted == city_name + &normalize(city.country)
    })
}

/// Cities whose name contains `query`, most populous first
pub fn search_cities(query: &str, max_results: usize) -> Vec<&'static City> {
    let wanted = normalize(query);
    if wanted.len() < MIN_QUERY_LEN {
        return Vec::new();
    }
    let mut found: Vec<&'static City> = CITIES
        .iter()
        .filter(|city| normalize(city.name).contains(&wanted))
        .collect();
    found.sort_by(|a, b| b.population.cmp(&a.population));
    found.truncate(max_results);
    found
}

/// The `count` most populous cities
pub fn popular_cities(count: usize) -> Vec<&'static City> {
    let mut all: Vec<&'static City> = CITIES.iter().collect();
    all.sort_by(|a, b| b.population.cmp(&a.population));
    all.truncate(count);
    all
}

/// Cities of one country (case-insensitive), most populous first
pub fn cities_in_country(country: &str) -> Vec<&'static City> {
    let mut found: Vec<&'static City> = CITIES
        .iter()
        .filter(|city| city.country.eq_ignore_ascii_case(country))
        .collect();
    found.sort_by(|a, b| b.population.cmp(&a.population));
    found
}
