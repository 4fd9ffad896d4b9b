//! Synthetic analytics events drawn from fixed value pools

use chrono::{DateTime, Utc};
use event_schema::{
    AnalyticsEvent, ApiCallProperties, ButtonClickProperties, ErrorProperties, EventEnvelope,
    EventType, HttpMethod, PageViewProperties, EVENT_DISTRIBUTION, USER_POOL_SIZE,
};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

const PAGES: &[&str] = &[
    "https://example.com/",
    "https://example.com/products",
    "https://example.com/about",
    "https://example.com/contact",
    "https://example.com/blog",
    "https://example.com/careers",
    "https://example.com/pricing",
    "https://example.com/docs",
    "https://example.com/dashboard",
];

const REFERRERS: &[&str] = &[
    "https://google.com",
    "https://facebook.com",
    "https://twitter.com",
    "https://linkedin.com",
];

/// (button id, label)
const BUTTONS: &[(&str, &str)] = &[
    ("cta-primary", "Get Started"),
    ("nav-products", "Products"),
    ("btn-submit", "Submit"),
    ("btn-cancel", "Cancel"),
    ("btn-buy-now", "Buy Now"),
    ("btn-learn-more", "Learn More"),
];

const API_ENDPOINTS: &[&str] = &[
    "/api/users",
    "/api/products",
    "/api/orders",
    "/api/auth/login",
    "/api/auth/logout",
    "/api/analytics/track",
];

const STATUS_CODES: &[u16] = &[200, 201, 204, 400, 401, 403, 404, 500, 502, 503];

const ERROR_TYPES: &[&str] = &[
    "TypeError",
    "ReferenceError",
    "SyntaxError",
    "NetworkError",
    "ValidationError",
];

const BROWSERS: &[&str] = &["Chrome", "Firefox", "Safari", "Edge"];

const OPERATING_SYSTEMS: &[&str] = &["Windows", "macOS", "Linux", "iOS", "Android"];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
];

/// Generate one event stamped with the current time.
pub fn generate_event<R: Rng + ?Sized>(rng: &mut R) -> AnalyticsEvent {
    generate_event_at(rng, Utc::now())
}

/// Generate one event of a randomly chosen type.
///
/// The type follows [`EVENT_DISTRIBUTION`]; every field is drawn from `rng`, so a
/// seeded generator yields a reproducible sequence apart from `timestamp`.
pub fn generate_event_at<R: Rng + ?Sized>(rng: &mut R, timestamp: DateTime<Utc>) -> AnalyticsEvent {
    match pick_event_type(rng) {
        EventType::PageView => {
            AnalyticsEvent::PageView(envelope(rng, timestamp, page_view_properties))
        }
        EventType::ButtonClick => {
            AnalyticsEvent::ButtonClick(envelope(rng, timestamp, button_click_properties))
        }
        EventType::ApiCall => AnalyticsEvent::ApiCall(envelope(rng, timestamp, api_call_properties)),
        EventType::Error => AnalyticsEvent::Error(envelope(rng, timestamp, error_properties)),
    }
}

/// Draw an event type by walking the cumulative distribution.
pub fn pick_event_type<R: Rng + ?Sized>(rng: &mut R) -> EventType {
    let roll: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (event_type, probability) in EVENT_DISTRIBUTION {
        cumulative += probability;
        if roll < cumulative {
            return event_type;
        }
    }
    // rounding can leave the sum a hair under 1.0
    EVENT_DISTRIBUTION[EVENT_DISTRIBUTION.len() - 1].0
}

/// `user_001` ..= `user_100`
pub fn random_user_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("user_{:03}", rng.gen_range(1..=USER_POOL_SIZE))
}

fn envelope<R, P>(
    rng: &mut R,
    timestamp: DateTime<Utc>,
    properties: fn(&mut R) -> P,
) -> EventEnvelope<P>
where
    R: Rng + ?Sized,
{
    EventEnvelope {
        event_id: random_uuid(rng),
        timestamp,
        user_id: random_user_id(rng),
        properties: properties(rng),
    }
}

fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, pool: &'a [T], name: &str) -> &'a T {
    match pool.choose(rng) {
        Some(value) => value,
        None => panic!("value pool `{name}` is empty"),
    }
}

fn page_view_properties<R: Rng + ?Sized>(rng: &mut R) -> PageViewProperties {
    PageViewProperties {
        page_url: pick(rng, PAGES, "pages").to_string(),
        referrer: pick(rng, REFERRERS, "referrers").to_string(),
        session_id: random_uuid(rng),
        viewport_width: rng.gen_range(1024..=1920),
        viewport_height: rng.gen_range(768..=1080),
    }
}

fn button_click_properties<R: Rng + ?Sized>(rng: &mut R) -> ButtonClickProperties {
    let (button_id, button_text) = *pick(rng, BUTTONS, "buttons");
    ButtonClickProperties {
        button_id: button_id.to_string(),
        button_text: button_text.to_string(),
        page_url: pick(rng, PAGES, "pages").to_string(),
        session_id: random_uuid(rng),
        click_x: rng.gen_range(0..=1920),
        click_y: rng.gen_range(0..=1080),
    }
}

fn api_call_properties<R: Rng + ?Sized>(rng: &mut R) -> ApiCallProperties {
    ApiCallProperties {
        endpoint: pick(rng, API_ENDPOINTS, "endpoints").to_string(),
        method: *pick(rng, &HttpMethod::ALL, "methods"),
        status_code: *pick(rng, STATUS_CODES, "status codes"),
        duration_ms: rng.gen_range(50..=2000),
        user_agent: pick(rng, USER_AGENTS, "user agents").to_string(),
    }
}

fn error_properties<R: Rng + ?Sized>(rng: &mut R) -> ErrorProperties {
    let error_type = *pick(rng, ERROR_TYPES, "error types");
    let stack_trace = rng.gen_bool(0.5).then(|| {
        format!(
            "Error: Something went wrong\n    at Object.<anonymous> (app.js:{}:{})",
            rng.gen_range(1..=500),
            rng.gen_range(1..=80)
        )
    });

    ErrorProperties {
        error_type: error_type.to_string(),
        message: format!("{error_type}: Something went wrong"),
        stack_trace,
        page_url: pick(rng, PAGES, "pages").to_string(),
        browser: pick(rng, BROWSERS, "browsers").to_string(),
        os: pick(rng, OPERATING_SYSTEMS, "operating systems").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_schema::{decode_event, encode_event};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_generated_events_validate() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..2_000 {
            let event = generate_event(&mut rng);
            event.validate().unwrap();

            let decoded = decode_event(&encode_event(&event).unwrap()).unwrap();
            assert_eq!(decoded.event_type(), event.event_type());
        }
    }

    #[test]
    fn test_type_distribution_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples = 10_000;

        let mut counts: HashMap<EventType, usize> = HashMap::new();
        for _ in 0..samples {
            *counts.entry(pick_event_type(&mut rng)).or_default() += 1;
        }

        for (event_type, expected) in EVENT_DISTRIBUTION {
            let observed = counts.get(&event_type).copied().unwrap_or(0) as f64 / samples as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "{event_type}: observed {observed:.3}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_user_ids_stay_in_pool() {
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..1_000 {
            let id = random_user_id(&mut rng);
            let n: u32 = id.strip_prefix("user_").unwrap().parse().unwrap();
            assert_eq!(id.len(), 8);
            assert!((1..=100).contains(&n));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let at = Utc::now();
        let a = generate_event_at(&mut StdRng::seed_from_u64(99), at);
        let b = generate_event_at(&mut StdRng::seed_from_u64(99), at);

        assert_eq!(a, b);
        assert_eq!(a.event_id().get_version_num(), 4);
    }

    #[test]
    fn test_error_message_names_type() {
        let mut rng = StdRng::seed_from_u64(3);

        let props = error_properties(&mut rng);
        assert_eq!(
            props.message,
            format!("{}: Something went wrong", props.error_type)
        );
    }

    #[test]
    #[should_panic(expected = "value pool `empty` is empty")]
    fn test_empty_pool_panics() {
        let mut rng = StdRng::seed_from_u64(0);
        let pool: &[&str] = &[];
        pick(&mut rng, pool, "empty");
    }
}
