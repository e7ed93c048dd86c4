//! Deterministic descriptions for assets the classifier left without one.

const CLOSING: &str = "Printed on archival fine-art paper with pigment inks, ready to frame.";

#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptionInput<'a> {
    pub title: Option<&'a str>,
    pub artist: Option<&'a str>,
    pub style: Option<&'a str>,
    pub subject: Option<&'a str>,
    pub era: Option<&'a str>,
    pub mood: Option<&'a str>,
    pub palette: Option<&'a str>,
}

fn present(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// "An" before a vowel-initial word, "A" otherwise.
pub fn article(word: &str) -> &'static str {
    match word.trim_start().chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "An",
        _ => "A",
    }
}

pub fn generate_description(input: &DescriptionInput<'_>) -> String {
    let style = present(input.style);
    let subject = present(input.subject);

    let mut out = match (style, subject) {
        (Some(style), Some(subject)) => format!(
            "{} {} {} piece",
            article(style),
            style,
            subject.to_lowercase()
        ),
        (Some(style), None) => format!("{} {} artwork", article(style), style),
        (None, Some(subject)) => {
            let subject = subject.to_lowercase();
            format!("{} {} study", article(&subject), subject)
        }
        (None, None) => "An original artwork".to_string(),
    };

    if let Some(title) = present(input.title) {
        out.push_str(&format!(" titled \"{title}\""));
    }
    if let Some(artist) = present(input.artist) {
        out.push_str(&format!(" by {artist}"));
    }
    out.push('.');

    if let Some(era) = present(input.era) {
        out.push_str(&format!(" It belongs to the {era} period."));
    }

    match (present(input.mood), present(input.palette)) {
        (Some(mood), Some(palette)) => out.push_str(&format!(
            " The {} mood is carried by a {} palette.",
            mood.to_lowercase(),
            palette.to_lowercase()
        )),
        (Some(mood), None) => out.push_str(&format!(" The work has a {} mood.", mood.to_lowercase())),
        (None, Some(palette)) => {
            out.push_str(&format!(" It is rendered in a {} palette.", palette.to_lowercase()))
        }
        (None, None) => {}
    }

    out.push(' ');
    out.push_str(CLOSING);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_follows_first_letter() {
        assert_eq!(article("Impressionism"), "An");
        assert_eq!(article("abstract"), "An");
        assert_eq!(article("Realism"), "A");
        assert_eq!(article(""), "A");
    }

    #[test]
    fn full_metadata() {
        let text = generate_description(&DescriptionInput {
            title: Some("Midnight Sun"),
            artist: Some("Edvard Munch"),
            style: Some("Expressionism"),
            subject: Some("Landscape"),
            era: Some("Early 20th Century"),
            mood: Some("Mysterious"),
            palette: Some("Cool"),
        });
        assert_eq!(
            text,
            "An Expressionism landscape piece titled \"Midnight Sun\" by Edvard Munch. \
             It belongs to the Early 20th Century period. \
             The mysterious mood is carried by a cool palette. \
             Printed on archival fine-art paper with pigment inks, ready to frame."
        );
    }

    #[test]
    fn opening_depends_on_style_and_subject() {
        let style_only = generate_description(&DescriptionInput {
            style: Some("Realism"),
            ..Default::default()
        });
        assert!(style_only.starts_with("A Realism artwork."));

        let subject_only = generate_description(&DescriptionInput {
            subject: Some("Animals"),
            ..Default::default()
        });
        assert!(subject_only.starts_with("An animals study."));

        let none = generate_description(&DescriptionInput::default());
        assert!(none.starts_with("An original artwork."));
        assert!(none.ends_with(CLOSING));
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let text = generate_description(&DescriptionInput {
            style: Some("  "),
            mood: Some("Serene"),
            ..Default::default()
        });
        assert!(text.starts_with("An original artwork."));
        assert!(text.contains("The work has a serene mood."));
    }
}
