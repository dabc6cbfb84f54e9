use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::DigestConfig;
use crate::llm::TextGenerator;
use crate::whatsapp::MessageSender;

const HEADLINE_LIMIT: usize = 5;
const WEATHER_UNAVAILABLE: &str = "unavailable";

// ── Date helpers ───────────────────────────────────────────────────────

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

/// Ordinal day-of-year string, e.g. "61/366".
pub fn day_of_year_line(date: NaiveDate) -> String {
    format!("{}/{}", date.ordinal(), days_in_year(date.year()))
}

// ── Weather (OpenWeatherMap current weather) ───────────────────────────

#[derive(Debug, Clone)]
pub struct WeatherReport {
    pub location: String,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
    #[serde(default)]
    weather: Vec<WeatherCondition>,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

async fn fetch_weather(client: &reqwest::Client, api_key: &str, location: &str) -> Result<String> {
    let response = client
        .get("https://api.openweathermap.org/data/2.5/weather")
        .query(&[
            ("q", location),
            ("appid", api_key),
            ("units", "metric"),
        ])
        .send()
        .await
        .context("Failed to reach weather service")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Weather API error ({})", status);
    }

    let weather: WeatherResponse = response
        .json()
        .await
        .context("Failed to parse weather response")?;

    let description = weather
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or("no description");

    Ok(format!(
        "{:.1}°C, {}, humidity {}%",
        weather.main.temp, description, weather.main.humidity
    ))
}

/// Fetch a summary per location. A failed fetch degrades that entry
/// to a placeholder instead of aborting the digest.
pub async fn gather_weather(
    client: &reqwest::Client,
    api_key: Option<&str>,
    locations: &[String],
) -> Vec<WeatherReport> {
    let mut reports = Vec::with_capacity(locations.len());
    for location in locations {
        let summary = match api_key {
            Some(key) => match fetch_weather(client, key, location).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("Weather fetch failed for {}: {:#}", location, e);
                    WEATHER_UNAVAILABLE.to_string()
                }
            },
            None => WEATHER_UNAVAILABLE.to_string(),
        };
        reports.push(WeatherReport {
            location: location.clone(),
            summary,
        });
    }
    reports
}

// ── News (NewsAPI top headlines) ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
}

async fn fetch_headlines(client: &reqwest::Client, api_key: &str) -> Result<Vec<String>> {
    let response = client
        .get("https://newsapi.org/v2/top-headlines")
        .query(&[("country", "br"), ("pageSize", "5")])
        .header("X-Api-Key", api_key)
        .send()
        .await
        .context("Failed to reach news service")?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("News API error ({})", status);
    }

    let news: NewsResponse = response
        .json()
        .await
        .context("Failed to parse news response")?;

    Ok(news
        .articles
        .into_iter()
        .filter_map(|a| a.title)
        .take(HEADLINE_LIMIT)
        .collect())
}

/// Fetch headlines; failure degrades to an empty list.
pub async fn gather_headlines(client: &reqwest::Client, api_key: Option<&str>) -> Vec<String> {
    let Some(key) = api_key else {
        return Vec::new();
    };
    match fetch_headlines(client, key).await {
        Ok(headlines) => headlines,
        Err(e) => {
            warn!("Headline fetch failed: {:#}", e);
            Vec::new()
        }
    }
}

// ── Prompt composition ─────────────────────────────────────────────────

/// Embed the gathered data in a natural-language prompt with explicit
/// formatting instructions for the model.
pub fn compose_prompt(date: NaiveDate, weather: &[WeatherReport], headlines: &[String]) -> String {
    let mut prompt = String::from(
        "Write a short, friendly good-morning message for a WhatsApp group. \
         Use WhatsApp formatting (*bold* for section titles), keep it under \
         15 lines, and do not invent data beyond what is given.\n\n",
    );

    prompt.push_str(&format!(
        "Date: {} (day {} of the year)\n\n",
        date.format("%Y-%m-%d"),
        day_of_year_line(date)
    ));

    prompt.push_str("Weather:\n");
    for report in weather {
        prompt.push_str(&format!("- {}: {}\n", report.location, report.summary));
    }

    if headlines.is_empty() {
        prompt.push_str("\nHeadlines: none available today, skip the news section.\n");
    } else {
        prompt.push_str("\nHeadlines:\n");
        for headline in headlines {
            prompt.push_str(&format!("- {}\n", headline));
        }
    }

    prompt
}

// ── Job entry point ────────────────────────────────────────────────────

/// Compose and deliver the daily digest to the target group.
pub async fn run(
    config: &DigestConfig,
    group_jid: &str,
    generator: &dyn TextGenerator,
    sender: &dyn MessageSender,
) -> Result<()> {
    info!("Composing daily digest for {}", group_jid);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default();

    let weather = gather_weather(
        &client,
        config.weather_api_key.as_deref(),
        &config.locations,
    )
    .await;
    let headlines = gather_headlines(&client, config.news_api_key.as_deref()).await;

    let today = Local::now().date_naive();
    let prompt = compose_prompt(today, &weather, &headlines);

    let digest = generator
        .generate(&prompt)
        .await
        .context("Digest generation failed")?;

    sender
        .send_text(group_jid, &digest)
        .await
        .context("Digest delivery failed")?;

    info!("Daily digest delivered to {}", group_jid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_years() {
        assert!(is_leap_year(2024));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(2023));
        assert!(!is_leap_year(2100));
    }

    #[test]
    fn test_days_in_year() {
        assert_eq!(days_in_year(2024), 366);
        assert_eq!(days_in_year(2023), 365);
        assert_eq!(days_in_year(2100), 365);
        assert_eq!(days_in_year(2000), 366);
    }

    #[test]
    fn test_day_of_year_line() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(day_of_year_line(date), "61/366");
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(day_of_year_line(date), "365/365");
    }

    #[tokio::test]
    async fn test_missing_weather_key_degrades_every_location() {
        let client = reqwest::Client::new();
        let locations = vec!["São Paulo".to_string(), "Recife".to_string()];
        let reports = gather_weather(&client, None, &locations).await;

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.summary, WEATHER_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn test_missing_news_key_degrades_to_no_headlines() {
        let client = reqwest::Client::new();
        assert!(gather_headlines(&client, None).await.is_empty());
    }

    #[test]
    fn test_prompt_keeps_unavailable_locations() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let weather = vec![
            WeatherReport {
                location: "São Paulo".to_string(),
                summary: "22.0°C, clear sky, humidity 60%".to_string(),
            },
            WeatherReport {
                location: "Recife".to_string(),
                summary: WEATHER_UNAVAILABLE.to_string(),
            },
        ];
        let prompt = compose_prompt(date, &weather, &["Top story".to_string()]);

        assert!(prompt.contains("São Paulo: 22.0°C"));
        assert!(prompt.contains("Recife: unavailable"));
        assert!(prompt.contains("Top story"));
        assert!(prompt.contains("153/366"));
    }

    #[test]
    fn test_prompt_without_headlines_says_skip() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let prompt = compose_prompt(date, &[], &[]);
        assert!(prompt.contains("skip the news section"));
        assert!(prompt.contains("1/365"));
    }
}
