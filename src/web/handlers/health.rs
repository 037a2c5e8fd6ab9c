use salvo::prelude::*;

#[handler]
pub async fn index() -> String {
    format!(
        "Hello World from {}@{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

#[handler]
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};

    use crate::web::middleware::auth::create_router;

    #[tokio::test]
    async fn index_and_health_respond() {
        let service = Service::new(create_router());

        let body = TestClient::get("http://127.0.0.1:5800/")
            .send(&service)
            .await
            .take_string()
            .await
            .expect("index body");
        assert_eq!(
            body,
            format!("Hello World from slack-irc-bridge@{}", env!("CARGO_PKG_VERSION"))
        );

        let health = TestClient::get("http://127.0.0.1:5800/health")
            .send(&service)
            .await
            .take_string()
            .await
            .expect("health body");
        assert_eq!(health, "OK");

        let missing = TestClient::get("http://127.0.0.1:5800/nope").send(&service).await;
        assert_eq!(missing.status_code, Some(StatusCode::NOT_FOUND));
    }
}
