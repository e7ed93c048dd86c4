/// Widths served on the asset detail page.
pub const DETAIL_WIDTHS: [u32; 5] = [400, 800, 1200, 1600, 2000];
/// Widths served on catalog cards.
pub const CARD_WIDTHS: [u32; 3] = [400, 800, 1200];

pub fn image_url(base: &str, drive_file_id: &str, width: u32) -> String {
    format!("{}/{}=w{}", base.trim_end_matches('/'), drive_file_id, width)
}

/// `width -> url` pairs in ascending width order.
pub fn image_set(base: &str, drive_file_id: &str, widths: &[u32]) -> Vec<(u32, String)> {
    widths
        .iter()
        .map(|w| (*w, image_url(base, drive_file_id, *w)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_carry_the_width_suffix() {
        assert_eq!(
            image_url("https://img.example.com/", "abc", 800),
            "https://img.example.com/abc=w800"
        );
        let set = image_set("https://img.example.com", "abc", &CARD_WIDTHS);
        assert_eq!(set.len(), 3);
        assert_eq!(set[2].0, 1200);
    }
}
