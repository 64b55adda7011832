#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate plaza;

    use actix_web::{web, App, HttpServer, HttpRequest, HttpResponse};
    use tracing::{error, info};
    use tracing_subscriber::{fmt, EnvFilter};

    use plaza::AppContext;
    use plaza::config::Config;
    use plaza::core::db::seed_demo_data;
    use plaza::core::store::Db;
    use plaza::images::{ImageHost, MemoryImages};

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Request, Method};

        pub fn actix_to_spin_request(
            req: &HttpRequest,
            body: actix_web::web::Bytes,
        ) -> anyhow::Result<Request> {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => anyhow::bail!("unsupported method {}", other),
            };

            let uri = req.uri().to_string();
            let body_vec = body.to_vec();

            let mut req_builder = Request::builder();
            let method_set = req_builder.method(method);
            let uri_set = method_set.uri(&uri);

            // Copy headers
            let mut with_headers = uri_set;
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    with_headers = with_headers.header(name.as_str(), val_str);
                }
            }

            Ok(with_headers.body(body_vec).build())
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();
            let content_type = spin_resp
                .header("content-type")
                .and_then(|v| v.as_str())
                .unwrap_or("application/json")
                .to_string();
            let body = spin_resp.body().to_vec();

            actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            )
            .content_type(content_type)
            .body(body)
        }
    }

    pub async fn run() -> std::io::Result<()> {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();

        let config = Config::load();
        let db = Db::memory();
        if config.seed_demo {
            if let Err(e) = seed_demo_data(&db) {
                error!("Failed to seed demo data: {}", e);
            }
        }
        let images = match &config.cloudinary {
            Some(_) => ImageHost::from_config(&config),
            // Keeps image routes usable on a laptop without hosting credentials.
            None => ImageHost::Memory(MemoryImages::new()),
        };

        let address = format!("0.0.0.0:{}", config.port);
        let ctx = web::Data::new(AppContext::new(config, db, images));

        info!("Server listening on http://{}", address);

        HttpServer::new(move || {
            App::new()
                .app_data(ctx.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(address)?
        .run()
        .await
    }

    async fn handle_all(
        ctx: web::Data<AppContext>,
        req: HttpRequest,
        body: web::Bytes,
    ) -> HttpResponse {
        let spin_req = match adapter::actix_to_spin_request(&req, body) {
            Ok(r) => r,
            Err(_) => {
                return HttpResponse::BadRequest()
                    .json(serde_json::json!({"error": "Invalid request"}))
            }
        };

        let spin_resp = plaza::handle_request(&ctx, spin_req).await;
        adapter::spin_to_actix_response(spin_resp)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
