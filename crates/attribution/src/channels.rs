//! Channel identification: which marketing channel brought this visit, and
//! what a visit from it is worth.

use chrono::{DateTime, Utc};
use insights_core::types::channel_key;
use serde::{Deserialize, Serialize};
use url::Url;

/// A page load as seen by the attribution layer.
#[derive(Debug, Clone)]
pub struct PageVisit {
    pub url: Url,
    pub referrer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PageVisit {
    pub fn new(url: Url, referrer: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            url,
            referrer: referrer.filter(|r| !r.trim().is_empty()),
            timestamp,
        }
    }

    /// Accepts absolute URLs or site-relative paths such as
    /// `/closet-doors?utm_source=nextdoor&utm_medium=social`.
    pub fn from_location(
        location: &str,
        referrer: Option<&str>,
        timestamp: DateTime<Utc>,
        site_host: &str,
    ) -> Result<Self, url::ParseError> {
        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("https://{site_host}/"))?.join(location)?
            }
            Err(e) => return Err(e),
        };
        Ok(Self::new(url, referrer.map(str::to_string), timestamp))
    }

    fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Where a visit came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMatch {
    pub source: String,
    pub medium: String,
    pub campaign: Option<String>,
    pub content: Option<String>,
    pub term: Option<String>,
}

impl ChannelMatch {
    fn plain(source: &str, medium: &str) -> Self {
        Self {
            source: source.to_string(),
            medium: medium.to_string(),
            campaign: None,
            content: None,
            term: None,
        }
    }

    pub fn channel(&self) -> String {
        channel_key(&self.source, &self.medium)
    }
}

pub const MEDIUM_ORGANIC: &str = "organic";
pub const MEDIUM_SOCIAL: &str = "social";
pub const MEDIUM_LOCAL_DIRECTORY: &str = "local-directory";
pub const MEDIUM_EMAIL: &str = "email";
pub const MEDIUM_REFERRAL: &str = "referral";
pub const MEDIUM_NONE: &str = "none";

/// Identify the channel for a visit, in priority order: campaign parameters,
/// ad click identifiers, external referrer, then direct traffic on the
/// visitor's first ever visit. Later direct and internal visits yield `None`.
pub fn identify(visit: &PageVisit, site_host: &str, first_visit: bool) -> Option<ChannelMatch> {
    if let Some(campaign) = from_campaign_params(visit) {
        return Some(campaign);
    }
    if let Some(referred) = visit
        .referrer
        .as_deref()
        .and_then(|r| from_referrer(r, site_host))
    {
        return Some(referred);
    }
    first_visit.then(|| ChannelMatch::plain("direct", MEDIUM_NONE))
}

fn from_campaign_params(visit: &PageVisit) -> Option<ChannelMatch> {
    let campaign = visit.query("utm_campaign");
    let content = visit.query("utm_content");
    let term = visit.query("utm_term");

    if let (Some(source), Some(medium)) = (visit.query("utm_source"), visit.query("utm_medium")) {
        return Some(ChannelMatch {
            source: source.to_lowercase(),
            medium: medium.to_lowercase(),
            campaign,
            content,
            term,
        });
    }

    let clicked = if visit.query("gclid").is_some() {
        ChannelMatch::plain("google", "cpc")
    } else if visit.query("fbclid").is_some() {
        ChannelMatch::plain("facebook", "paid-social")
    } else {
        return None;
    };
    Some(ChannelMatch {
        campaign,
        content,
        term,
        ..clicked
    })
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// `None` for unparseable referrers and for the site's own pages.
fn from_referrer(referrer: &str, site_host: &str) -> Option<ChannelMatch> {
    let url = Url::parse(referrer).ok()?;
    let host = normalize_host(url.host_str()?);
    if host.is_empty() || host == normalize_host(site_host) {
        return None;
    }
    let (source, medium) = categorize_host(&host);
    Some(ChannelMatch::plain(&source, medium))
}

const WEBMAIL_HOSTS: &[(&str, &str)] = &[
    ("mail.google.com", "gmail"),
    ("outlook.live.com", "outlook"),
    ("outlook.office.com", "outlook"),
    ("outlook.office365.com", "outlook"),
    ("mail.yahoo.com", "yahoo-mail"),
    ("mail.aol.com", "aol-mail"),
    ("mail.proton.me", "proton-mail"),
];

const LOCAL_DIRECTORIES: &[(&str, &str)] = &[
    ("yelp", "yelp"),
    ("angi", "angi"),
    ("angieslist", "angi"),
    ("homeadvisor", "homeadvisor"),
    ("houzz", "houzz"),
    ("thumbtack", "thumbtack"),
    ("bbb", "bbb"),
    ("yellowpages", "yellowpages"),
    ("porch", "porch"),
];

const SEARCH_ENGINES: &[(&str, &str)] = &[
    ("google", "google"),
    ("bing", "bing"),
    ("yahoo", "yahoo"),
    ("duckduckgo", "duckduckgo"),
    ("ecosia", "ecosia"),
    ("baidu", "baidu"),
    ("yandex", "yandex"),
];

const SOCIAL_PLATFORMS: &[(&str, &str)] = &[
    ("facebook", "facebook"),
    ("fb", "facebook"),
    ("instagram", "instagram"),
    ("twitter", "twitter"),
    ("linkedin", "linkedin"),
    ("lnkd", "linkedin"),
    ("pinterest", "pinterest"),
    ("youtube", "youtube"),
    ("nextdoor", "nextdoor"),
    ("tiktok", "tiktok"),
    ("reddit", "reddit"),
];

/// Map a normalised referrer host to `(source, medium)`.
pub fn categorize_host(host: &str) -> (String, &'static str) {
    if let Some((_, source)) = WEBMAIL_HOSTS.iter().find(|(h, _)| *h == host) {
        return (source.to_string(), MEDIUM_EMAIL);
    }
    if host.starts_with("maps.google.") || host == "g.page" {
        return ("google-maps".to_string(), MEDIUM_LOCAL_DIRECTORY);
    }
    match host {
        "t.co" | "x.com" => return ("twitter".to_string(), MEDIUM_SOCIAL),
        "m.me" | "l.facebook.com" | "lm.facebook.com" => {
            return ("facebook".to_string(), MEDIUM_SOCIAL)
        }
        _ => {}
    }

    // Every label but the public suffix, so "yelp.com" and "m.yelp.ca" both match "yelp".
    let labels: Vec<&str> = host.split('.').collect();
    let named = &labels[..labels.len().saturating_sub(1)];
    let lookup = |table: &[(&str, &str)]| {
        table
            .iter()
            .find(|(label, _)| named.contains(label))
            .map(|(_, source)| source.to_string())
    };

    if let Some(source) = lookup(LOCAL_DIRECTORIES) {
        return (source, MEDIUM_LOCAL_DIRECTORY);
    }
    if let Some(source) = lookup(SEARCH_ENGINES) {
        return (source, MEDIUM_ORGANIC);
    }
    if let Some(source) = lookup(SOCIAL_PLATFORMS) {
        return (source, MEDIUM_SOCIAL);
    }
    (host.to_string(), MEDIUM_REFERRAL)
}

const CHANNEL_VALUES: &[(&str, f64)] = &[
    ("google:organic", 120.0),
    ("bing:organic", 100.0),
    ("yahoo:organic", 95.0),
    ("duckduckgo:organic", 95.0),
    ("direct:none", 100.0),
    ("google:cpc", 110.0),
    ("facebook:paid-social", 70.0),
    ("facebook:social", 60.0),
    ("nextdoor:social", 60.0),
    ("instagram:social", 50.0),
    ("pinterest:social", 45.0),
    ("youtube:social", 45.0),
    ("google-maps:local-directory", 85.0),
    ("houzz:local-directory", 85.0),
    ("yelp:local-directory", 80.0),
    ("angi:local-directory", 75.0),
    ("homeadvisor:local-directory", 75.0),
    ("thumbtack:local-directory", 70.0),
    ("bbb:local-directory", 70.0),
];

const MEDIUM_VALUES: &[(&str, f64)] = &[
    ("organic", 90.0),
    ("none", 100.0),
    ("cpc", 100.0),
    ("paid-social", 60.0),
    ("local-directory", 70.0),
    ("email", 65.0),
    ("social", 45.0),
    ("referral", 35.0),
];

const DEFAULT_CHANNEL_VALUE: f64 = 30.0;

/// Estimated lead value of a visit from `source:medium`.
pub fn channel_value(source: &str, medium: &str) -> f64 {
    let key = channel_key(source, medium);
    CHANNEL_VALUES
        .iter()
        .find(|(k, _)| *k == key)
        .or_else(|| MEDIUM_VALUES.iter().find(|(m, _)| *m == medium))
        .map(|(_, v)| *v)
        .unwrap_or(DEFAULT_CHANNEL_VALUE)
}
