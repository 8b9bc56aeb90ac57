//! Static source-credibility table (0–100) and known-fake blacklist.

use url::Url;

/// Score for domains not in either table.
pub const UNKNOWN_CREDIBILITY: u8 = 50;

const NEWS_DOMAINS: &[(&str, u8)] = &[
    // international
    ("bbc.com", 90),
    ("bbc.co.uk", 90),
    ("reuters.com", 95),
    ("apnews.com", 95),
    ("nytimes.com", 85),
    ("washingtonpost.com", 85),
    ("theguardian.com", 85),
    ("wsj.com", 85),
    ("economist.com", 90),
    ("bloomberg.com", 85),
    ("ft.com", 90),
    ("aljazeera.com", 80),
    ("france24.com", 85),
    ("dw.com", 85),
    // national
    ("npr.org", 85),
    ("pbs.org", 85),
    ("time.com", 80),
    ("theatlantic.com", 80),
    ("newyorker.com", 80),
    ("politico.com", 80),
    ("axios.com", 80),
    ("latimes.com", 80),
    ("chicagotribune.com", 80),
    ("bostonglobe.com", 80),
    ("usatoday.com", 75),
    ("cnn.com", 75),
    ("nbcnews.com", 80),
    ("abcnews.go.com", 80),
    ("cbsnews.com", 80),
    // mainstream, mixed quality
    ("foxnews.com", 70),
    ("newsweek.com", 70),
    ("thehill.com", 75),
    ("vox.com", 75),
    ("slate.com", 70),
    ("thedailybeast.com", 65),
    ("huffpost.com", 65),
    ("buzzfeednews.com", 70),
    ("vice.com", 65),
    // tabloids
    ("nypost.com", 60),
    ("dailymail.co.uk", 55),
    ("thesun.co.uk", 50),
    ("mirror.co.uk", 55),
    ("express.co.uk", 55),
    // partisan
    ("breitbart.com", 45),
    ("dailycaller.com", 45),
    ("theblaze.com", 45),
    ("oann.com", 40),
    ("newsmax.com", 40),
    // misinformation
    ("infowars.com", 20),
    ("naturalnews.com", 15),
    ("zerohedge.com", 25),
    // science / tech
    ("scientificamerican.com", 90),
    ("nature.com", 95),
    ("science.org", 95),
    ("newscientist.com", 85),
    ("wired.com", 80),
    ("techcrunch.com", 75),
    ("arstechnica.com", 85),
    ("technologyreview.com", 85),
    // business
    ("cnbc.com", 80),
    ("forbes.com", 75),
    ("businessinsider.com", 70),
    ("marketwatch.com", 75),
    // other international
    ("cbc.ca", 85),
    ("abc.net.au", 85),
    ("smh.com.au", 80),
    ("irishtimes.com", 80),
    ("independent.co.uk", 75),
    ("telegraph.co.uk", 75),
    ("thelocal.fr", 75),
    ("thelocal.de", 75),
    ("spiegel.de", 85),
    ("scmp.com", 75),
];

const FAKE_NEWS_DOMAINS: &[&str] = &[
    "infowars.com",
    "naturalnews.com",
    "worldnewsdailyreport.com",
    "empirenews.net",
    "nationalreport.net",
    "worldtruth.tv",
    "beforeitsnews.com",
    "endingthefed.com",
    "dcclothesline.com",
    "redflagnews.com",
    "disclose.tv",
    "yournewswire.com",
    "newspunch.com",
    "americannews.com",
    "thelastlineofdefense.org",
    "libertywriters.com",
    "civictribune.com",
    "amplifyingglass.com",
    "abcnews.com.co",
    "usatoday.com.co",
    "washingtonpost.com.co",
    "nbc.com.co",
    "cnn.com.co",
    "foxnews.com.co",
];

/// Host with a leading `www.` removed.
pub fn domain_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

pub fn is_known_fake(domain: &str) -> bool {
    FAKE_NEWS_DOMAINS.contains(&domain)
}

/// Blacklisted → 0, listed → table score, otherwise 50.
pub fn credibility(domain: &str) -> u8 {
    if is_known_fake(domain) {
        return 0;
    }
    NEWS_DOMAINS
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, score)| *score)
        .unwrap_or(UNKNOWN_CREDIBILITY)
}
