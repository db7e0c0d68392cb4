use super::AnalysisClient;
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAiClient {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(model: String, api_key: String, base_url: String) -> Self {
        Self {
            model,
            api_key,
            base_url,
            temperature: 0.2,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnalysisClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": self.temperature,
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?
            .to_string();
        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let c = OpenAiClient::new("m".into(), "k".into(), "http://localhost:8080/v1/".into());
        assert_eq!(c.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
