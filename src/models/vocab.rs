//! Closed vocabularies the classifier must answer from, plus the place
//! names the catalog filters look for inside `ai_tags`.

pub const STYLES: &[&str] = &[
    "Impressionism",
    "Post-Impressionism",
    "Expressionism",
    "Realism",
    "Romanticism",
    "Art Nouveau",
    "Art Deco",
    "Abstract",
    "Cubism",
    "Surrealism",
    "Pop Art",
    "Minimalism",
    "Japanese Woodblock",
    "Botanical Illustration",
    "Vintage Poster",
    "Photography",
    "Folk Art",
    "Renaissance",
    "Baroque",
    "Contemporary",
];

pub const MOODS: &[&str] = &[
    "Serene",
    "Joyful",
    "Melancholic",
    "Dramatic",
    "Mysterious",
    "Romantic",
    "Energetic",
    "Nostalgic",
    "Contemplative",
    "Whimsical",
    "Dark",
    "Uplifting",
];

pub const SUBJECTS: &[&str] = &[
    "Landscape",
    "Seascape",
    "Portrait",
    "Still Life",
    "Botanical",
    "Animals",
    "Cityscape",
    "Architecture",
    "Abstract",
    "Figurative",
    "Mythology",
    "Religious",
    "Travel",
    "Maps",
    "Transportation",
    "Interior",
];

pub const ERAS: &[&str] = &[
    "Pre-1800",
    "19th Century",
    "Early 20th Century",
    "Mid-Century",
    "Late 20th Century",
    "Contemporary",
];

pub const PALETTES: &[&str] = &[
    "Warm",
    "Cool",
    "Earthy",
    "Pastel",
    "Monochrome",
    "Vibrant",
    "Muted",
    "Black and White",
    "Jewel Tones",
    "Neutral",
];

pub const CONTINENTS: &[&str] = &[
    "Europe",
    "Asia",
    "North America",
    "South America",
    "Africa",
    "Oceania",
];

pub const COUNTRIES: &[&str] = &[
    "France",
    "Italy",
    "Spain",
    "Germany",
    "Netherlands",
    "England",
    "Scotland",
    "Ireland",
    "Norway",
    "Sweden",
    "Russia",
    "Greece",
    "Egypt",
    "Morocco",
    "Nigeria",
    "Kenya",
    "South Africa",
    "Japan",
    "China",
    "India",
    "Turkey",
    "United States",
    "Canada",
    "Mexico",
    "Brazil",
    "Argentina",
    "Peru",
    "Australia",
    "New Zealand",
];

/// Case-insensitive lookup returning the canonical spelling.
pub fn canonical(vocab: &[&'static str], value: &str) -> Option<&'static str> {
    let value = value.trim();
    vocab.iter().copied().find(|v| v.eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_ignores_case_and_padding() {
        assert_eq!(canonical(STYLES, " art nouveau "), Some("Art Nouveau"));
        assert_eq!(canonical(PALETTES, "WARM"), Some("Warm"));
        assert_eq!(canonical(MOODS, "Grumpy"), None);
    }
}
