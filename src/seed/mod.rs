use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::Genre;

pub const DEFAULT_SEED_URL: &str = "https://everynoise.com";

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to fetch the visualization page: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Visualization page returned http status {0}.")]
    Status(u16),
}

/// One genre div as rendered on the visualization page, before
/// normalization. The encodings are documented on the page author's blog:
/// the red channel is energy, green is dynamic variation, blue is
/// instrumentalness; y-position is organicness, x-position is bounciness,
/// font size is popularity.
#[derive(Debug, Clone)]
struct RawGenre {
    name: String,
    key: String,
    example: String,
    color: String,
    top: i64,
    left: i64,
    font_size: i64,
}

impl RawGenre {
    fn red(&self) -> i64 {
        hex_channel(&self.color[0..2])
    }

    fn green(&self) -> i64 {
        hex_channel(&self.color[2..4])
    }

    fn blue(&self) -> i64 {
        hex_channel(&self.color[4..6])
    }
}

// This adapter is deliberately fragile: it reads another site's rendered
// markup, and no amount of error plumbing survives a DOM change. Malformed
// elements panic with the offending fragment instead of producing garbage
// genre data.
fn hex_channel(hex: &str) -> i64 {
    i64::from_str_radix(hex, 16).expect("genre color channel is two hex digits")
}

static ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div [^>]*class="genre scanme"[^>]*>.*?</div>"#).unwrap()
});
static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"playx\("(\w+)""#).unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"color: #([0-9a-fA-F]{6}); top: (\d+)px; left: (\d+)px; font-size: (\d+)%")
        .unwrap()
});
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"title="e\.g\. ([^"]*)""#).unwrap());
static TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">([^<>]*)</div>$").unwrap());

/// Fetches the visualization page and returns every genre it renders, the
/// six style-encoded channels normalized into `[0, 1]` against the min/max
/// observed across the whole set.
pub async fn all_genres(url: &str) -> Result<Vec<Genre>, SeedError> {
    let response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SeedError::Status(status.as_u16()));
    }

    let html = response.text().await?;
    Ok(normalize(parse_document(&html)))
}

fn parse_document(html: &str) -> Vec<RawGenre> {
    ELEMENT_RE
        .find_iter(html)
        .map(|element| parse_element(element.as_str()))
        .collect()
}

fn parse_element(element: &str) -> RawGenre {
    let key = KEY_RE
        .captures(element)
        .expect("genre element has a play handler")[1]
        .to_string();

    let style = STYLE_RE
        .captures(element)
        .expect("genre element has a style attribute");
    let color = style[1].to_string();
    let top = style[2].parse().expect("genre 'top' is an integer");
    let left = style[3].parse().expect("genre 'left' is an integer");
    let font_size = style[4].parse().expect("genre 'font-size' is an integer");

    let example = TITLE_RE
        .captures(element)
        .expect("genre element has a title attribute")[1]
        .to_string();

    let text = TEXT_RE
        .captures(element)
        .expect("genre element has inner text")[1]
        .to_string();
    let name = text.trim_end().trim_end_matches('»').trim_end().to_string();

    RawGenre {
        name,
        key,
        example,
        color,
        top,
        left,
        font_size,
    }
}

fn normalize(raw: Vec<RawGenre>) -> Vec<Genre> {
    let reds = Range::over(raw.iter().map(RawGenre::red));
    let greens = Range::over(raw.iter().map(RawGenre::green));
    let blues = Range::over(raw.iter().map(RawGenre::blue));
    let tops = Range::over(raw.iter().map(|genre| genre.top));
    let lefts = Range::over(raw.iter().map(|genre| genre.left));
    let font_sizes = Range::over(raw.iter().map(|genre| genre.font_size));

    raw.into_iter()
        .map(|genre| Genre {
            energy: reds.normalize(genre.red()),
            dynamic_variation: greens.normalize(genre.green()),
            instrumentalness: blues.normalize(genre.blue()),
            organicness: tops.normalize(genre.top),
            bounciness: lefts.normalize(genre.left),
            popularity: font_sizes.normalize(genre.font_size),

            name: genre.name,
            key: genre.key,
            example: genre.example,
            ..Genre::default()
        })
        .collect()
}

struct Range {
    min: i64,
    max: i64,
}

impl Range {
    fn over(values: impl Iterator<Item = i64>) -> Self {
        let mut range = Range { min: i64::MAX, max: i64::MIN };
        for value in values {
            range.min = range.min.min(value);
            range.max = range.max.max(value);
        }
        range
    }

    fn normalize(&self, value: i64) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        (value - self.min) as f64 / (self.max - self.min) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = concat!(
        r#"<html><body><div class="canvas">"#,
        r#"<div id=item0 class="genre scanme" preview_url="u0" "#,
        r#"onclick='playx("key0", "pop", this);' title="e.g. A Band &quot;A Song&quot;" "#,
        r#"style="color: #ff8000; top: 100px; left: 200px; font-size: 150%">pop» </div>"#,
        r#"<div id=item1 class="genre scanme" preview_url="u1" "#,
        r#"onclick='playx("key1", "vapor twitch", this);' title="e.g. Someone Else" "#,
        r#"style="color: #004080; top: 300px; left: 600px; font-size: 100%">vapor twitch» </div>"#,
        r#"</div></body></html>"#,
    );

    #[test]
    fn test_parse_document_extracts_elements() {
        let raw = parse_document(FIXTURE);
        assert_eq!(raw.len(), 2);

        assert_eq!(raw[0].name, "pop");
        assert_eq!(raw[0].key, "key0");
        assert_eq!(raw[0].example, "A Band &quot;A Song&quot;");
        assert_eq!(raw[0].color, "ff8000");
        assert_eq!((raw[0].top, raw[0].left, raw[0].font_size), (100, 200, 150));

        assert_eq!(raw[1].name, "vapor twitch");
        assert_eq!(raw[1].red(), 0x00);
        assert_eq!(raw[1].green(), 0x40);
        assert_eq!(raw[1].blue(), 0x80);
    }

    #[test]
    fn test_normalization_maps_extremes_to_unit_interval() {
        let genres = normalize(parse_document(FIXTURE));
        assert_eq!(genres.len(), 2);

        // red 0xff vs 0x00: energy 1.0 then 0.0
        assert_eq!(genres[0].energy, 1.0);
        assert_eq!(genres[1].energy, 0.0);

        // top 100 vs 300: organicness 0.0 then 1.0
        assert_eq!(genres[0].organicness, 0.0);
        assert_eq!(genres[1].organicness, 1.0);

        // font size 150 vs 100: popularity 1.0 then 0.0
        assert_eq!(genres[0].popularity, 1.0);
        assert_eq!(genres[1].popularity, 0.0);
    }

    #[test]
    fn test_degenerate_range_normalizes_to_zero() {
        let raw = vec![RawGenre {
            name: "solo".into(),
            key: "k".into(),
            example: "e".into(),
            color: "808080".into(),
            top: 10,
            left: 10,
            font_size: 100,
        }];
        let genres = normalize(raw);
        assert_eq!(genres[0].energy, 0.0);
        assert_eq!(genres[0].bounciness, 0.0);
    }
}
