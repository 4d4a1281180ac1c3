// ============================================================================
// Module: core/src/vision_extractor.rs
// Description: Vision-LLM invoice extraction with escalation (C6)
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use invoice_shared::config::VisionConfig;
use invoice_shared::error::{Error, Result};

/// Task kind drives which prompt fields are mandatory, spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    Sales,
    Vendor,
    MappingSheet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedHeader {
    pub vendor_name: Option<String>,
    pub receipt_number: Option<String>,
    pub date: Option<String>,
    #[serde(default)]
    pub field_confidence: std::collections::HashMap<String, f64>,
    #[serde(default)]
    pub overall_confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExtraction {
    pub header: ExtractedHeader,
    pub items: Vec<ExtractedItem>,
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub header: ExtractedHeader,
    pub items: Vec<ExtractedItem>,
    pub model_used: String,
    pub fallback_attempted: bool,
    pub fallback_reason: Option<String>,
    pub cost_local_currency: Decimal,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Token-bucket rate limiter, spec §4.6 step 6.
pub struct TokenBucket {
    capacity: u32,
    tokens: Mutex<(u32, Instant)>,
    refill_per_minute: u32,
}

impl TokenBucket {
    pub fn new(refill_per_minute: u32) -> Self {
        Self {
            capacity: refill_per_minute,
            tokens: Mutex::new((refill_per_minute, Instant::now())),
            refill_per_minute,
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut guard = self.tokens.lock().await;
                let (tokens, last_refill) = &mut *guard;

                let elapsed = last_refill.elapsed();
                let refilled = (elapsed.as_secs_f64() / 60.0 * self.refill_per_minute as f64) as u32;
                if refilled > 0 {
                    *tokens = (*tokens + refilled).min(self.capacity);
                    *last_refill = Instant::now();
                }

                if *tokens > 0 {
                    *tokens -= 1;
                    None
                } else {
                    Some(Duration::from_millis(60_000 / self.refill_per_minute.max(1) as u64))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

pub struct VisionExtractor {
    client: Client,
    config: VisionConfig,
    rate_limiter: Arc<TokenBucket>,
}

impl VisionExtractor {
    pub fn new(config: VisionConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fallback_timeout_secs))
            .build()
            .expect("reqwest client builder");
        let rate_limiter = Arc::new(TokenBucket::new(config.rate_limit_rpm));

        Self {
            client,
            config,
            rate_limiter,
        }
    }

    pub async fn extract(
        &self,
        image_bytes: &[u8],
        system_prompt: &str,
        kind: ExtractionKind,
    ) -> Result<ExtractionResult> {
        self.rate_limiter.acquire().await;

        let primary = self
            .call_model(&self.config.primary_model, image_bytes, system_prompt, 5, self.config.primary_timeout_secs)
            .await;

        let (raw, used_fallback, fallback_reason) = match primary {
            Ok(raw) => {
                let accuracy = mean_item_confidence(&raw.items);
                let gate_failure = quality_gate_failure(&raw.header, &raw.items, kind, &self.config);

                if accuracy < self.config.accuracy_escalation_threshold || gate_failure.is_some() {
                    let reason = gate_failure
                        .unwrap_or_else(|| format!("accuracy {accuracy:.1} below threshold"));
                    info!(reason, "escalating to fallback model");

                    self.rate_limiter.acquire().await;
                    match self
                        .call_model(&self.config.fallback_model, image_bytes, system_prompt, 5, self.config.fallback_timeout_secs)
                        .await
                    {
                        Ok(fallback_raw) => (fallback_raw, true, Some(reason)),
                        Err(e) => {
                            warn!(error = %e, "fallback model failed, keeping primary result");
                            (raw, true, Some(format!("{reason}; fallback failed: {e}")))
                        }
                    }
                } else {
                    (raw, false, None)
                }
            }
            Err(primary_err) => {
                warn!(error = %primary_err, "primary model failed, escalating to fallback");
                self.rate_limiter.acquire().await;
                let fallback_raw = self
                    .call_model(&self.config.fallback_model, image_bytes, system_prompt, 5, self.config.fallback_timeout_secs)
                    .await?;
                (fallback_raw, true, Some(format!("primary failed: {primary_err}")))
            }
        };

        let model_used = if used_fallback {
            self.config.fallback_model.clone()
        } else {
            self.config.primary_model.clone()
        };

        let cost = compute_cost(&model_used, raw.prompt_tokens, raw.completion_tokens, &self.config);

        Ok(ExtractionResult {
            header: raw.header,
            items: raw.items,
            model_used,
            fallback_attempted: used_fallback,
            fallback_reason,
            cost_local_currency: cost,
            prompt_tokens: raw.prompt_tokens,
            completion_tokens: raw.completion_tokens,
        })
    }

    /// Calls the vision model with exponential back-off on JSON/validation
    /// errors, up to `max_attempts`, spec §4.6 step 4.
    async fn call_model(
        &self,
        model: &str,
        image_bytes: &[u8],
        system_prompt: &str,
        max_attempts: u32,
        timeout_secs: u64,
    ) -> Result<RawExtraction> {
        let mut attempt = 0;
        let mut delay = Duration::from_millis(500);

        loop {
            attempt += 1;
            let outcome = self
                .call_model_once(model, image_bytes, system_prompt, timeout_secs)
                .await;

            match outcome {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt < max_attempts => {
                    warn!(model, attempt, error = %e, "extraction attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    return Err(Error::ExtractionFailed(format!(
                        "{model} failed after {attempt} attempts: {e}"
                    )))
                }
            }
        }
    }

    async fn call_model_once(
        &self,
        model: &str,
        image_bytes: &[u8],
        system_prompt: &str,
        timeout_secs: u64,
    ) -> Result<RawExtraction> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);

        let body = serde_json::json!({
            "model": model,
            "temperature": 0.1,
            "response_format": {"type": "json_object"},
            "system": system_prompt,
            "image_b64": encoded,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(timeout_secs))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::UpstreamTimeout(e.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|e| Error::ExtractionFailed(format!("reading response body: {e}")))?;

        let cleaned = strip_json_fences(&text);
        debug!(model, "parsing vision model response");

        serde_json::from_str(&cleaned)
            .map_err(|e| Error::ExtractionFailed(format!("invalid JSON from {model}: {e}")))
    }
}

/// Strips an optional ```json ... ``` Markdown fence, spec §4.6 step 1.
fn strip_json_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim().to_string()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Mean of item-level confidence scores; 100 when the prompt opted out,
/// spec §4.6 step 2.
fn mean_item_confidence(items: &[ExtractedItem]) -> f64 {
    let scored: Vec<f64> = items.iter().filter_map(|i| i.confidence).collect();
    if scored.is_empty() {
        100.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    }
}

fn is_placeholder(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a")
        }
        serde_json::Value::Null => true,
        _ => false,
    }
}

/// Quality gate checks, spec §4.6 step 3. Returns a failure reason if any
/// gate trips.
fn quality_gate_failure(
    header: &ExtractedHeader,
    items: &[ExtractedItem],
    kind: ExtractionKind,
    config: &VisionConfig,
) -> Option<String> {
    if kind == ExtractionKind::Vendor
        && header.vendor_name.as_deref().map(str::trim).unwrap_or("").is_empty()
    {
        return Some("missing vendor name".to_string());
    }

    if !items.is_empty()
        && items
            .iter()
            .all(|item| item.fields.values().all(is_placeholder))
    {
        return Some("all items are placeholders".to_string());
    }

    if let Some(confidence) = header.field_confidence.get("receipt_number") {
        if *confidence < config.receipt_number_confidence_floor {
            return Some(format!("receipt_number confidence {confidence:.1} below threshold"));
        }
    }

    if let Some(overall) = header.overall_confidence {
        if overall < config.overall_confidence_floor {
            return Some(format!("overall confidence {overall:.1} below threshold"));
        }
    }

    None
}

/// Cost in local currency, rounded to 4 decimal places, spec §4.6 step 5.
fn compute_cost(model: &str, prompt_tokens: u32, completion_tokens: u32, config: &VisionConfig) -> Decimal {
    let (prompt_rate, completion_rate) = if model == config.primary_model {
        (config.primary_prompt_rate_per_million, config.primary_completion_rate_per_million)
    } else {
        (config.fallback_prompt_rate_per_million, config.fallback_completion_rate_per_million)
    };

    let prompt_cost = Decimal::from(prompt_tokens) * prompt_rate / dec!(1_000_000);
    let completion_cost = Decimal::from(completion_tokens) * completion_rate / dec!(1_000_000);
    let usd_cost = prompt_cost + completion_cost;

    (usd_cost * config.usd_to_local_rate).round_dp(4)
}

/// Normalized bounding box, center in `[0,1] x [0,1]`.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    fn center(&self) -> (f64, f64) {
        ((self.x_min + self.x_max) / 2.0, (self.y_min + self.y_max) / 2.0)
    }
}

/// Merges the receipt-number and date bounding boxes into a combined
/// min-bounding rectangle when their centers are close, spec §4.6
/// ("Bounding-box handling").
pub fn merge_boxes_if_close(a: BoundingBox, b: BoundingBox) -> (BoundingBox, Option<BoundingBox>) {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    let distance = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
    let diagonal = (2.0_f64).sqrt();

    if distance / diagonal <= 0.3 {
        let combined = BoundingBox {
            x_min: a.x_min.min(b.x_min),
            y_min: a.y_min.min(b.y_min),
            x_max: a.x_max.max(b.x_max),
            y_max: a.y_max.max(b.y_max),
        };
        (combined, None)
    } else {
        (a, Some(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vision_config() -> VisionConfig {
        VisionConfig {
            api_key: "test-key".to_string(),
            endpoint: "https://example.test".to_string(),
            primary_model: "primary-model".to_string(),
            fallback_model: "fallback-model".to_string(),
            primary_timeout_secs: 120,
            fallback_timeout_secs: 180,
            retry_attempts: 5,
            rate_limit_rpm: 30,
            accuracy_escalation_threshold: 70.0,
            receipt_number_confidence_floor: 50.0,
            overall_confidence_floor: 70.0,
            primary_prompt_rate_per_million: dec!(75),
            primary_completion_rate_per_million: dec!(300),
            fallback_prompt_rate_per_million: dec!(1250),
            fallback_completion_rate_per_million: dec!(5000),
            usd_to_local_rate: dec!(83.0),
        }
    }

    #[test]
    fn strips_json_fence() {
        let text = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_json_fences(text), "{\"a\":1}");
    }

    #[test]
    fn no_fence_is_passthrough() {
        assert_eq!(strip_json_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn mean_confidence_defaults_to_100_when_absent() {
        let items = vec![ExtractedItem {
            fields: serde_json::Map::new(),
            confidence: None,
        }];
        assert_eq!(mean_item_confidence(&items), 100.0);
    }

    #[test]
    fn mean_confidence_averages_scored_items() {
        let items = vec![
            ExtractedItem { fields: serde_json::Map::new(), confidence: Some(80.0) },
            ExtractedItem { fields: serde_json::Map::new(), confidence: Some(60.0) },
        ];
        assert_eq!(mean_item_confidence(&items), 70.0);
    }

    #[test]
    fn vendor_kind_requires_vendor_name() {
        let header = ExtractedHeader {
            vendor_name: None,
            receipt_number: None,
            date: None,
            field_confidence: Default::default(),
            overall_confidence: None,
        };
        let failure = quality_gate_failure(&header, &[], ExtractionKind::Vendor, &test_vision_config());
        assert!(failure.is_some());
    }

    #[test]
    fn date_low_confidence_does_not_escalate() {
        let mut field_confidence = std::collections::HashMap::new();
        field_confidence.insert("date".to_string(), 10.0);
        let header = ExtractedHeader {
            vendor_name: Some("Acme".to_string()),
            receipt_number: None,
            date: None,
            field_confidence,
            overall_confidence: Some(90.0),
        };
        assert!(quality_gate_failure(&header, &[], ExtractionKind::Sales, &test_vision_config()).is_none());
    }

    #[test]
    fn close_boxes_merge() {
        let a = BoundingBox { x_min: 0.1, y_min: 0.1, x_max: 0.2, y_max: 0.15 };
        let b = BoundingBox { x_min: 0.12, y_min: 0.11, x_max: 0.22, y_max: 0.16 };
        let (_, second) = merge_boxes_if_close(a, b);
        assert!(second.is_none());
    }

    #[test]
    fn distant_boxes_stay_separate() {
        let a = BoundingBox { x_min: 0.0, y_min: 0.0, x_max: 0.1, y_max: 0.1 };
        let b = BoundingBox { x_min: 0.8, y_min: 0.8, x_max: 0.9, y_max: 0.9 };
        let (_, second) = merge_boxes_if_close(a, b);
        assert!(second.is_some());
    }
}
