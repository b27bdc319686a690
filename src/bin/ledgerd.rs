//! The entry-store backend: the ledger API plus the demo pages the client
//! loads, stacked behind CORS and request logging.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ledgerd::context::Context;
use ledgerd::ledger::{LedgerStore, api_router};
use ledgerd::middleware::{Cors, Next, RequestLog, from_middleware, terminal};
use ledgerd::server::Server;
use ledgerd::{Response, StatusCode};

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Ledger</title></head>
<body>
  <h1>Ledger</h1>
  <p><a href="/app.html">Open the balance sheet</a></p>
</body>
</html>
"#;

const APP_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link rel="manifest" href="/manifest.json">
  <title>Balance Sheet</title>
</head>
<body>
  <h1>Balance Sheet</h1>
  <form id="entry-form">
    <input id="title" placeholder="Title" required>
    <input id="amount" type="number" step="0.01" placeholder="Amount" required>
    <button type="submit">Add</button>
  </form>
  <ul id="entries"></ul>
  <script>
    const list = document.getElementById('entries');
    const form = document.getElementById('entry-form');
    async function refresh() {
      try {
        const entries = await (await fetch('/api/entries')).json();
        localStorage.setItem('entries', JSON.stringify(entries));
        render(entries);
      } catch {
        render(JSON.parse(localStorage.getItem('entries') || '[]'));
      }
    }
    function render(entries) {
      list.innerHTML = '';
      for (const e of entries) {
        const li = document.createElement('li');
        li.textContent = `${e.title}: ${e.amount}`;
        list.appendChild(li);
      }
    }
    form.addEventListener('submit', async (ev) => {
      ev.preventDefault();
      await fetch('/api/entries', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({
          title: document.getElementById('title').value,
          amount: Number(document.getElementById('amount').value),
        }),
      });
      form.reset();
      refresh();
    });
    refresh();
  </script>
</body>
</html>
"#;

const WEB_MANIFEST: &str = r#"{
  "name": "Balance Sheet",
  "short_name": "Ledger",
  "start_url": "/app.html",
  "display": "standalone"
}
"#;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn page(body: &'static str, content_type: &'static str) -> Response {
    Response::new(StatusCode::Ok)
        .header("Content-Type", content_type)
        .body(body)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let addr =
        std::env::var("LEDGERD_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_owned());

    let mut router = api_router(Arc::new(LedgerStore::new()));
    router.get("/", |_ctx: Context| async {
        page(INDEX_HTML, "text/html; charset=utf-8")
    });
    router.get("/app.html", |_ctx: Context| async {
        page(APP_HTML, "text/html; charset=utf-8")
    });
    router.get("/manifest.json", |_ctx: Context| async {
        page(WEB_MANIFEST, "application/json")
    });
    // SPA fallback for any other GET
    router.get("/*", |_ctx: Context| async {
        page(INDEX_HTML, "text/html; charset=utf-8")
    });

    let router = Arc::new(router);
    let chain: Vec<ledgerd::middleware::MiddlewareHandler> = vec![
        from_middleware(Arc::new(RequestLog)),
        from_middleware(Arc::new(Cors::new())),
        terminal(move |ctx: Context| {
            let router = Arc::clone(&router);
            // the router re-matches from the raw request; the middleware
            // chain only ever sees one terminal entry
            async move { router.route(ctx.into_request()).await }
        }),
    ];

    let server = Server::bind(&addr).await?;
    info!(address = %server.local_addr(), "ledgerd up");

    server
        .run(move |request| {
            let chain = chain.clone();
            async move { Next::new(chain).run(Context::new(request)).await }
        })
        .await?;

    Ok(())
}
