//! Client for the external image classification service plus the
//! per-message verdict aggregation.
//!
//! The service speaks multipart/form-data in and JSON out:
//! `{"result": "fake"|"real"|"error", "score": 0-100}`. Anything that goes
//! wrong on the wire degrades to the neutral outcome; a message is never
//! failed because one attachment could not be classified.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Normalized per-attachment outcome. `score` is a confidence in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub label: String,
    pub score: f64,
}

impl Verdict {
    /// Fallback used for timeouts, transport errors and unparsable bodies.
    pub fn neutral() -> Self {
        Verdict {
            label: "error".to_string(),
            score: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default, alias = "label")]
    result: String,
    /// The service reports confidence as a 0-100 percentage.
    #[serde(default)]
    score: f64,
}

pub struct Classifier {
    client: reqwest::Client,
    url: String,
}

impl Classifier {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Classifier {
            client,
            url: url.to_string(),
        })
    }

    /// Classify one stored attachment blob. Never returns an error: any
    /// failure collapses into [`Verdict::neutral`].
    pub async fn analyze(&self, path: &str) -> Verdict {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path, error = %e, "attachment blob unreadable, neutral verdict");
                return Verdict::neutral();
            }
        };
        let file_name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime = mime_for(&file_name);

        let part = match reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path, error = %e, "could not build multipart body");
                return Verdict::neutral();
            }
        };
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = match self.client.post(&self.url).multipart(form).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path, error = %e, "classifier request failed, neutral verdict");
                return Verdict::neutral();
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(path, status = %resp.status(), "classifier returned non-2xx");
            return Verdict::neutral();
        }
        match resp.json::<AnalyzeResponse>().await {
            Ok(body) => Verdict {
                label: body.result,
                score: (body.score / 100.0).clamp(0.0, 1.0),
            },
            Err(e) => {
                tracing::warn!(path, error = %e, "classifier response unparsable");
                Verdict::neutral()
            }
        }
    }
}

/// Message-level verdict: phishing iff any attachment was labeled fake at
/// or above the threshold; score is the maximum confidence observed.
pub fn aggregate(verdicts: &[Verdict], threshold: f64) -> (bool, f64) {
    let phishing = verdicts
        .iter()
        .any(|v| v.label == "fake" && v.score >= threshold);
    let score = verdicts.iter().map(|v| v.score).fold(0.0_f64, f64::max);
    (phishing, score)
}

pub(crate) fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".png") {
        "image/png"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(label: &str, score: f64) -> Verdict {
        Verdict {
            label: label.to_string(),
            score,
        }
    }

    #[test]
    fn aggregates_fake_above_threshold() {
        let (phishing, score) = aggregate(&[v("fake", 0.95), v("real", 0.1)], 0.8);
        assert!(phishing);
        assert_eq!(score, 0.95);
    }

    #[test]
    fn fake_below_threshold_is_not_phishing() {
        let (phishing, score) = aggregate(&[v("fake", 0.5)], 0.8);
        assert!(!phishing);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn no_attachments_default_to_clean_zero() {
        let (phishing, score) = aggregate(&[], 0.8);
        assert!(!phishing);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn neutral_outcomes_never_trigger() {
        let (phishing, score) = aggregate(&[Verdict::neutral(), Verdict::neutral()], 0.8);
        assert!(!phishing);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn wire_scores_are_percentages() {
        let body: AnalyzeResponse =
            serde_json::from_str(r#"{"result": "fake", "score": 93.5}"#).unwrap();
        let normalized = (body.score / 100.0).clamp(0.0, 1.0);
        assert!((normalized - 0.935).abs() < 1e-9);
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(mime_for("x.JPG"), "image/jpeg");
        assert_eq!(mime_for("x.png"), "image/png");
        assert_eq!(mime_for("x.gif"), "application/octet-stream");
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("a.png");
        tokio::fs::write(&blob, b"not really a png").await.unwrap();
        // Nothing listens on this port; the request fails fast.
        let classifier = Classifier::new("http://127.0.0.1:9/analyze", 1).unwrap();
        let verdict = classifier.analyze(&blob.display().to_string()).await;
        assert_eq!(verdict, Verdict::neutral());
    }
}
