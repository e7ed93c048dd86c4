use crate::entities::{asset, asset_variant};
use crate::models::description::{generate_description, DescriptionInput};
use crate::models::images::image_url;
use crate::models::pricing::price_tier;
use crate::services::shopify::{ImageInput, ProductInput, VariantInput};

pub const PRODUCT_TYPE: &str = "Art Print";
pub const PRODUCT_IMAGE_WIDTH: u32 = 2000;

/// Stored description, or a generated one when it is blank.
pub fn description_for(asset: &asset::Model) -> String {
    match asset.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => generate_description(&DescriptionInput {
            title: asset.title.as_deref(),
            artist: asset.artist.as_deref(),
            style: asset.style.as_deref(),
            subject: asset.subject.as_deref(),
            era: asset.era.as_deref(),
            mood: asset.mood.as_deref(),
            palette: asset.palette.as_deref(),
        }),
    }
}

/// ai_tags followed by style, mood and era, deduplicated case-insensitively.
pub fn product_tags(asset: &asset::Model) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let extras = [&asset.style, &asset.mood, &asset.era];
    let candidates = asset
        .ai_tags
        .iter()
        .map(String::as_str)
        .chain(extras.into_iter().filter_map(|v| v.as_deref()));
    for tag in candidates {
        let tag = tag.trim();
        if tag.is_empty() || tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        tags.push(tag.to_string());
    }
    tags
}

fn sku(asset: &asset::Model, variant: &asset_variant::Model) -> String {
    let short: String = asset.id.simple().to_string().chars().take(8).collect();
    format!("PV-{}-{}", short, variant.label.to_uppercase().replace(' ', "-"))
}

/// Builds the product-create request for one asset. `None` when the asset
/// has nothing sellable: no stored variants or no source file to render.
pub fn product_payload(
    asset: &asset::Model,
    variants: &[asset_variant::Model],
    image_base: &str,
) -> Option<ProductInput> {
    let drive_file_id = asset.drive_file_id.as_deref()?;
    if variants.is_empty() {
        return None;
    }

    let mut ordered: Vec<&asset_variant::Model> = variants.iter().collect();
    ordered.sort_by_key(|v| v.sort_order);

    let variants = ordered
        .into_iter()
        .map(|v| {
            let tier = price_tier(v.width_cm, v.height_cm);
            VariantInput {
                option1: format!("{} ({} x {} cm)", v.label, v.width_cm, v.height_cm),
                price: tier.price,
                compare_at_price: tier.compare_price,
                sku: sku(asset, v),
            }
        })
        .collect();

    let title = asset
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| asset.filename.clone());

    Some(ProductInput {
        title,
        body_html: format!("<p>{}</p>", description_for(asset)),
        vendor: asset.artist.clone().unwrap_or_else(|| "Unknown Artist".to_string()),
        product_type: PRODUCT_TYPE.to_string(),
        tags: product_tags(asset).join(", "),
        options: vec![serde_json::json!({ "name": "Size" })],
        variants,
        images: vec![ImageInput {
            src: image_url(image_base, drive_file_id, PRODUCT_IMAGE_WIDTH),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::tests::sample_asset;
    use uuid::Uuid;

    fn variant(asset_id: Uuid, label: &str, w: f64, h: f64, order: i32) -> asset_variant::Model {
        asset_variant::Model {
            id: Uuid::new_v4(),
            asset_id,
            label: label.to_string(),
            width_cm: w,
            height_cm: h,
            width_inches: w / 2.54,
            height_inches: h / 2.54,
            effective_dpi: 300.0,
            quality_grade: "excellent".to_string(),
            sort_order: order,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn each_variant_is_priced_by_its_own_area() {
        let asset = sample_asset(1);
        let variants = vec![
            variant(asset.id, "Large", 60.0, 90.0, 2),
            variant(asset.id, "Small", 20.0, 30.0, 0),
        ];
        let product = product_payload(&asset, &variants, "https://img.example.com").unwrap();

        assert_eq!(product.variants.len(), 2);
        assert!(product.variants[0].option1.starts_with("Small"));
        assert_eq!(product.variants[0].price, "29.99");
        assert_eq!(product.variants[1].price, "119.99");
        assert_eq!(product.vendor, "Claude Monet");
        assert_eq!(
            product.images[0].src,
            format!("https://img.example.com/{}=w2000", asset.drive_file_id.clone().unwrap())
        );
    }

    #[test]
    fn tags_merge_without_duplicates() {
        let mut asset = sample_asset(2);
        asset.ai_tags = vec!["water lilies".into(), "impressionism".into()];
        asset.mood = Some("Serene".into());
        asset.era = None;
        let tags = product_tags(&asset);
        assert_eq!(tags, vec!["water lilies", "impressionism", "Serene"]);
    }

    #[test]
    fn missing_description_is_generated() {
        let mut asset = sample_asset(3);
        asset.description = None;
        let variants = vec![variant(asset.id, "Small", 20.0, 30.0, 0)];
        let product = product_payload(&asset, &variants, "https://img.example.com").unwrap();
        assert!(product.body_html.contains("Printed on archival fine-art paper"));
    }

    #[test]
    fn nothing_to_sell_without_variants() {
        let asset = sample_asset(4);
        assert!(product_payload(&asset, &[], "https://img.example.com").is_none());
    }
}
