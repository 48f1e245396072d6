// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use the_statewood::config::{load_config, RuntimeConfig};
use the_statewood::errors::HandlerError;
use the_statewood::graph::TraitSpec;
use the_statewood::runtime::{Action, Runtime};
use the_statewood::task::{TaskContext, TaskPolicy, TaskRunner};
use the_statewood::traits::resource_fn;

const MODULE_ID: &str = "checkout";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn int(value: Option<&Value>) -> i64 {
    value.and_then(Value::as_i64).unwrap_or(0)
}

/// The demo module: a cart with derived totals, a validation check and a
/// coupon looked up asynchronously.
fn checkout_traits() -> Vec<TraitSpec> {
    vec![
        TraitSpec::computed("subtotal", ["items"], |inputs| {
            let items = inputs.get("items").and_then(Value::as_array);
            json!(items.map_or(0, |items| items.iter().map(|item| int(item.get("price"))).sum::<i64>()))
        }),
        TraitSpec::computed("total", ["subtotal", "coupon"], |inputs| {
            let discount = inputs
                .get("coupon")
                .and_then(|coupon| coupon.get("data"))
                .and_then(|data| data.get("percent_off"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let subtotal = int(inputs.get("subtotal"));
            json!(subtotal - subtotal * discount / 100)
        }),
        TraitSpec::link("summary.total", "total"),
        TraitSpec::check("items", ["items"], |inputs| {
            let empty = inputs.get("items").and_then(Value::as_array).map_or(true, Vec::is_empty);
            empty.then(|| json!("cart is empty"))
        }),
        TraitSpec::source(
            "coupon",
            ["coupon_code"],
            |inputs| inputs.get("coupon_code").filter(|code| !code.is_null()).cloned(),
            resource_fn(|code: Value| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                match code.as_str() {
                    Some("RUST10") => Ok(json!({"percent_off": 10})),
                    _ => Err(anyhow::anyhow!("unknown coupon {}", code)),
                }
            }),
        ),
    ]
}

#[tokio::main]
async fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };

    if let Err(e) = run(config).await {
        eprintln!("❌ Demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let runtime = Runtime::new(config);
    let settings = runtime.settings_for(MODULE_ID);

    println!("🧺 Statewood Checkout Demo");
    println!("═══════════════════════════");
    println!("🔧 Converge mode: {} ({})", settings.converge_mode, settings.config_scope);
    println!("🛣️  Lanes: {}", settings.lanes_scope);
    println!();

    let module = runtime.instantiate(MODULE_ID, json!({"items": [], "coupon_code": null}))?;
    module.declare_traits(checkout_traits())?;
    module.reducer("add_item", |txn, payload| {
        let mut items = txn.get("items").cloned().unwrap_or_else(|| json!([]));
        if let Value::Array(list) = &mut items {
            list.push(payload.clone());
        }
        txn.update("items", items)?;
        Ok(())
    });
    module.reducer("apply_coupon", |txn, payload| {
        txn.update("coupon_code", payload.clone())?;
        Ok(())
    });
    module.on_error(|source, error| eprintln!("⚠️  {} failed: {}", source, error));

    let report = module.start()?;
    println!("✅ Initial convergence: {} nodes changed", report.changed_nodes);

    let _printer = module.subscribe(|event| {
        println!(
            "📦 txn {} [{}] {} patches, total = {}",
            event.txn_id,
            event.origin,
            event.patches.len(),
            event.state["total"],
        );
    });

    // Typing a coupon code: only the last keystroke is looked up.
    let typing = TaskRunner::new("coupon-input", TaskPolicy::Latest).spawn(
        &module,
        module.on_action("type_coupon").debounce(Duration::from_millis(30)),
        |ctx: TaskContext, code: Value| async move {
            ctx.dispatch(Action::new("apply_coupon", code)).await?;
            Ok::<(), HandlerError>(())
        },
    )?;

    for (name, price) in [("keyboard", 120), ("mouse", 40)] {
        module
            .dispatch(Action::new("add_item", json!({"name": name, "price": price})))
            .await?;
    }
    for partial in ["R", "RU", "RUST", "RUST10"] {
        module.dispatch(Action::new("type_coupon", json!(partial))).await?;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = typing.stop().await;

    let state = module.snapshot();
    println!();
    println!("📊 Results:");
    println!("   Subtotal: {}", state["subtotal"]);
    println!("   Total:    {}", state["summary"]["total"]);
    println!("   Coupon:   {}", state["coupon"]);
    println!(
        "   Coupon runner: {} accepted, {} canceled, {} completed",
        stats.accepted, stats.canceled, stats.completed
    );
    println!("⏱️  Elapsed: {:?}", started.elapsed());

    runtime.shutdown();
    Ok(())
}
