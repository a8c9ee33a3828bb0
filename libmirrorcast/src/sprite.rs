//! Team logo sprite sheet and the CSS that indexes into it

use futures::future::join_all;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::Path;

use crate::bots::RunOptions;
use crate::config::{expand_path, Config};
use crate::error::{MediaError, PlatformError, Result};
use crate::sources::{check_status, http_client};
use crate::sources::twitch::TeamRoster;

const SPRITE_USER_AGENT: &str = "mirrorcast-sprite";

/// A vertical strip of square logos plus one CSS rule per logo
pub struct SpriteSheet {
    pub image: RgbaImage,
    pub css: String,
    /// Roster keys in sheet order
    pub keys: Vec<String>,
}

impl SpriteSheet {
    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .map_err(MediaError::from)?;
        Ok(())
    }
}

pub fn css_rule(key: &str, offset: u32) -> String {
    format!(
        "a[href*=\"{}\"]:before {{ background-position: 0 -{}px }}\n",
        key, offset
    )
}

/// Resize every logo to `size`×`size` and stack them top to bottom
pub fn build_sheet(logos: &[(String, DynamicImage)], size: u32) -> SpriteSheet {
    let mut image = RgbaImage::new(size, size * logos.len() as u32);
    let mut css = String::new();
    let mut keys = Vec::with_capacity(logos.len());

    for (i, (key, logo)) in logos.iter().enumerate() {
        let offset = size * i as u32;
        let thumb = logo.resize_exact(size, size, FilterType::Lanczos3).to_rgba8();
        imageops::overlay(&mut image, &thumb, 0, i64::from(offset));
        css.push_str(&css_rule(key, offset));
        keys.push(key.clone());
    }

    SpriteSheet { image, css, keys }
}

pub fn decode_logo(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| MediaError::from(e).into())
}

async fn download_logo(client: &reqwest::Client, url: &str) -> Result<DynamicImage> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(PlatformError::from)?;
    let response = check_status("Logo host", url, response).await?;
    let bytes = response.bytes().await.map_err(PlatformError::from)?;
    decode_logo(&bytes)
}

/// Download every member's logo in roster order
///
/// Members without a logo, or whose logo fails to download or decode, are
/// left out.
pub async fn download_logos(client: &reqwest::Client, roster: &TeamRoster) -> Vec<(String, DynamicImage)> {
    let wanted: Vec<(&String, &str)> = roster
        .members
        .iter()
        .filter_map(|(key, member)| {
            let logo = member.channel.logo.as_deref().filter(|l| !l.is_empty());
            if logo.is_none() {
                tracing::warn!("No logo for {}", key);
            }
            logo.map(|l| (key, l))
        })
        .collect();

    let results = join_all(wanted.iter().map(|(_, url)| download_logo(client, url))).await;

    wanted
        .into_iter()
        .zip(results)
        .filter_map(|((key, url), result)| match result {
            Ok(logo) => {
                tracing::info!("Downloaded {}", key);
                Some((key.clone(), logo))
            }
            Err(e) => {
                tracing::warn!("Skipping logo for {} ({}): {}", key, url, e);
                None
            }
        })
        .collect()
}

/// Fetch the roster, build the sheet, and write it unless this is a dry run
pub async fn run(config: &Config, options: RunOptions) -> Result<SpriteSheet> {
    let sprite = &config.sprite;
    let client = http_client(SPRITE_USER_AGENT)?;

    let roster = TeamRoster::fetch(&client, &sprite.team_url, None).await?;
    let logos = download_logos(&client, &roster).await;
    if logos.is_empty() {
        return Err(MediaError::Empty(sprite.team_url.clone()).into());
    }

    let sheet = build_sheet(&logos, sprite.thumb_size);
    let output = expand_path(&sprite.output);

    if options.dry_run {
        tracing::info!("[dry run] Would write {} logos to {}", sheet.keys.len(), output.display());
    } else {
        sheet.save(&output)?;
        tracing::info!("Wrote {} logos to {}", sheet.keys.len(), output.display());
    }

    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn test_css_rule() {
        assert_eq!(
            css_rule("1234", 76),
            "a[href*=\"1234\"]:before { background-position: 0 -76px }\n"
        );
    }

    #[test]
    fn test_build_sheet_stacks_logos() {
        let logos = vec![
            ("a".to_string(), solid(100, 100, [255, 0, 0, 255])),
            ("b".to_string(), solid(10, 20, [0, 0, 255, 255])),
        ];

        let sheet = build_sheet(&logos, 38);

        assert_eq!(sheet.image.dimensions(), (38, 76));
        assert_eq!(sheet.image.get_pixel(19, 19), &Rgba([255, 0, 0, 255]));
        assert_eq!(sheet.image.get_pixel(19, 57), &Rgba([0, 0, 255, 255]));
        assert_eq!(sheet.keys, vec!["a", "b"]);
        assert_eq!(
            sheet.css,
            "a[href*=\"a\"]:before { background-position: 0 -0px }\n\
             a[href*=\"b\"]:before { background-position: 0 -38px }\n"
        );
    }

    #[test]
    fn test_decode_logo() {
        let mut png = Vec::new();
        solid(4, 4, [1, 2, 3, 255])
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let logo = decode_logo(&png).unwrap();
        assert_eq!((logo.width(), logo.height()), (4, 4));

        assert!(decode_logo(b"definitely not an image").is_err());
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sprite.png");
        let sheet = build_sheet(&[("a".to_string(), solid(2, 2, [0, 255, 0, 255]))], 38);

        sheet.save(&path).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (38, 38));
    }
}
