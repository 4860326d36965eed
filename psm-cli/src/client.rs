use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: reqwest::Client,
    /// 장시간 작업용 (stop은 강제 종료 유예 때문에 5초 이상 걸릴 수 있음)
    long_client: reqwest::Client,
    base_url: String,
}

#[allow(dead_code)]
impl DaemonClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        let long_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create long-timeout HTTP client");

        Self {
            client,
            long_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    // ─── 내부 헬퍼 ───

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        Self::into_json(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        Self::into_json(response).await
    }

    async fn post_empty(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).send().await?;
        Self::into_json(response).await
    }

    async fn post_empty_long(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.long_client.post(&url).send().await?;
        Self::into_json(response).await
    }

    async fn patch_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.patch(&url).json(body).send().await?;
        Self::into_json(response).await
    }

    async fn put_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.put(&url).json(body).send().await?;
        Self::into_json(response).await
    }

    async fn delete_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.long_client.delete(&url).send().await?;
        Self::into_json(response).await
    }

    /// 에러 응답이면 데몬의 error 필드를 그대로 전달
    async fn into_json(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            anyhow::bail!("Daemon returned {}: {}", status, message);
        }
        Ok(serde_json::from_str(&body)?)
    }

    // ============ Scripts ============

    /// GET /api/scripts — 카탈로그 + 런타임 상태 ({"scripts": [...]})
    pub async fn list_scripts(&self) -> anyhow::Result<Vec<Value>> {
        let data = self.get_json("/api/scripts").await?;
        Ok(data
            .get("scripts")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// POST /api/scripts — 스크립트 추가
    pub async fn add_script(
        &self,
        path: &str,
        interpreter: Option<&str>,
        args: &[String],
    ) -> anyhow::Result<Value> {
        let body = serde_json::json!({
            "path": path,
            "interpreter": interpreter,
            "args": args,
        });
        self.post_json("/api/scripts", &body).await
    }

    /// GET /api/script/{id}
    pub async fn get_script(&self, id: &str) -> anyhow::Result<Value> {
        self.get_json(&format!("/api/script/{}", id)).await
    }

    /// PATCH /api/script/{id} — 이름/인터프리터/args/autostart 업데이트
    pub async fn update_script(&self, id: &str, patch: Value) -> anyhow::Result<Value> {
        self.patch_json(&format!("/api/script/{}", id), &patch).await
    }

    /// DELETE /api/script/{id} — 카탈로그에서 제거
    pub async fn delete_script(&self, id: &str) -> anyhow::Result<Value> {
        self.delete_json(&format!("/api/script/{}", id)).await
    }

    // ============ Lifecycle ============

    /// POST /api/script/{id}/start
    pub async fn start_script(&self, id: &str) -> anyhow::Result<Value> {
        self.post_empty(&format!("/api/script/{}/start", id)).await
    }

    /// POST /api/script/{id}/stop — 강제 종료 유예 포함, 롱 타임아웃
    pub async fn stop_script(&self, id: &str) -> anyhow::Result<Value> {
        self.post_empty_long(&format!("/api/script/{}/stop", id)).await
    }

    /// POST /api/script/{id}/pause
    pub async fn pause_script(&self, id: &str) -> anyhow::Result<Value> {
        self.post_empty(&format!("/api/script/{}/pause", id)).await
    }

    /// POST /api/script/{id}/resume
    pub async fn resume_script(&self, id: &str) -> anyhow::Result<Value> {
        self.post_empty(&format!("/api/script/{}/resume", id)).await
    }

    // ============ Console ============

    /// GET /api/script/{id}/console?since=N — 시퀀스 ID 기반 폴링
    pub async fn console_since(&self, id: &str, since: u64) -> anyhow::Result<Vec<Value>> {
        let data = self
            .get_json(&format!("/api/script/{}/console?since={}", id, since))
            .await?;
        Ok(data
            .get("lines")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// GET /api/script/{id}/console?recent=N — 히스토리 꼬리
    pub async fn console_recent(&self, id: &str, count: usize) -> anyhow::Result<Vec<Value>> {
        let data = self
            .get_json(&format!("/api/script/{}/console?recent={}", id, count))
            .await?;
        Ok(data
            .get("lines")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// POST /api/script/{id}/stdin — 콘솔 입력 전송
    pub async fn send_stdin(&self, id: &str, input: &str) -> anyhow::Result<Value> {
        let body = serde_json::json!({ "input": input });
        self.post_json(&format!("/api/script/{}/stdin", id), &body).await
    }

    // ============ Usage / Settings ============

    /// GET /api/usage — 전체 부하
    pub async fn usage(&self) -> anyhow::Result<Value> {
        self.get_json("/api/usage").await
    }

    /// GET /api/settings
    pub async fn get_settings(&self) -> anyhow::Result<Value> {
        self.get_json("/api/settings").await
    }

    /// PUT /api/settings — 부분 업데이트
    pub async fn put_settings(&self, update: Value) -> anyhow::Result<Value> {
        self.put_json("/api/settings", &update).await
    }

    /// 데몬 생존 확인 — usage 엔드포인트가 응답하면 살아있는 것으로 간주
    pub async fn ping(&self) -> bool {
        self.get_json("/api/usage").await.is_ok()
    }
}
