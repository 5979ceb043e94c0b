use restfetch::{CallOptions, ClientOptions, FetchRequest, Fetcher, Hooks, Query, Registry};
use serde_json::Value;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional: enable basic logging for the example
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // RESTFETCH_URL_API / RESTFETCH_URL_REFRESH, or a public placeholder API.
    let options = ClientOptions::from_env().unwrap_or_else(|_| {
        ClientOptions::from_values("https://jsonplaceholder.typicode.com/", "", None)
    });
    let hooks = Hooks::default()
        .on_error_response(|err| eprintln!("request failed: {err}"))
        .on_error_refresh(|| eprintln!("session expired, please log in again"));

    let registry = Registry::new();
    let api = registry.get_or_create("api", Some(options.with_hooks(hooks)));

    let query = Query::new().param("_userId", 1).param("_limit", 4);
    let cached = CallOptions::new().use_cache(true).log(true);
    let posts: Option<Value> = api.get("posts", Some(&query), Some(&cached)).await;
    println!("typed client payload: {posts:?}");

    let fetcher = Fetcher::new();
    fetcher.set_base_url("https://jsonplaceholder.typicode.com");
    if let Some(envelope) = fetcher.get(FetchRequest::new("posts/1").log(true)).await {
        println!("status {} data {:?}", envelope.info.status, envelope.data);
    }
    Ok(())
}
