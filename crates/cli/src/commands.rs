//! Cart commands.
//!
//! Each mutating command looks the product up in the cart as currently
//! displayed (so remote line ids are known), dispatches, waits for the remote
//! queue to drain, then prints the cart and any notifications.

use thiserror::Error;

use cartsync::config::CartConfig;
use cartsync::notify::{Notification, NotificationLevel, RecordingNotifier};
use cartsync::view::CartView;
use cartsync::{CartEngine, CartError, DisplayCartItem, ReconciledCart};
use cartsync_core::ProductId;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine could not be set up.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// The product is not in the displayed cart.
    #[error("Product not in cart: {0}")]
    NotInCart(String),

    /// JSON output failed.
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An engine plus the notifications it produced during this run.
pub struct Session {
    engine: CartEngine,
    notifications: RecordingNotifier,
    json: bool,
}

impl Session {
    /// Build the engine from configuration.
    pub fn open(config: &CartConfig, json: bool) -> Result<Self, CliError> {
        let notifications = RecordingNotifier::new();
        let engine = CartEngine::from_config(config, notifications.clone())?;
        tracing::debug!(?engine, "Engine ready");

        Ok(Self {
            engine,
            notifications,
            json,
        })
    }

    pub async fn show(&self) -> Result<(), CliError> {
        let cart = self.engine.display_cart().await;
        self.print_cart(&cart)
    }

    pub async fn count(&self) -> Result<(), CliError> {
        let cart = self.engine.display_cart().await;
        if self.json {
            emit(&serde_json::to_string(&serde_json::json!({
                "distinctCount": cart.distinct_count,
                "source": cart.source,
            }))?);
        } else {
            emit(&cart.distinct_count.to_string());
        }
        Ok(())
    }

    pub async fn add(&self, product_id: &str, quantity: i64) -> Result<(), CliError> {
        let changed = self
            .engine
            .dispatcher()
            .add(&ProductId::new(product_id), quantity);
        self.finish(changed).await
    }

    pub async fn set(&self, product_id: &str, input: &str) -> Result<(), CliError> {
        let item = self.find(product_id).await?;
        let changed = self.engine.dispatcher().set_quantity_input(&item, input);
        self.finish(changed).await
    }

    pub async fn increment(&self, product_id: &str) -> Result<(), CliError> {
        let item = self.find(product_id).await?;
        let changed = self.engine.dispatcher().increment(&item);
        self.finish(changed).await
    }

    pub async fn decrement(&self, product_id: &str) -> Result<(), CliError> {
        let item = self.find(product_id).await?;
        let changed = self.engine.dispatcher().decrement(&item);
        self.finish(changed).await
    }

    pub async fn remove(&self, product_id: &str) -> Result<(), CliError> {
        let item = self.find(product_id).await?;
        let changed = self.engine.dispatcher().remove(&item);
        self.finish(changed).await
    }

    pub async fn clear(&self) -> Result<(), CliError> {
        let changed = self.engine.dispatcher().clear();
        self.finish(changed).await
    }

    async fn find(&self, product_id: &str) -> Result<DisplayCartItem, CliError> {
        let cart = self.engine.display_cart().await;
        cart.find(&ProductId::new(product_id))
            .cloned()
            .ok_or_else(|| CliError::NotInCart(product_id.to_string()))
    }

    /// Drain the remote queue, report what happened, print the cart.
    async fn finish(&self, changed: bool) -> Result<(), CliError> {
        self.engine.flush().await;

        if !changed {
            tracing::info!("Nothing changed");
        }
        for notification in self.notifications.drain() {
            report(&notification);
        }

        let cart = self.engine.display_cart().await;
        self.print_cart(&cart)
    }

    fn print_cart(&self, cart: &ReconciledCart) -> Result<(), CliError> {
        let view = cart.view();
        if self.json {
            emit(&serde_json::to_string_pretty(&view)?);
        } else {
            emit(&render(&view));
        }
        Ok(())
    }
}

/// Plain-text rendering of a cart.
fn render(view: &CartView) -> String {
    let source = match view.source {
        cartsync::CartSource::Local => "local",
        cartsync::CartSource::Remote => "remote",
    };

    if view.items.is_empty() {
        return format!("Cart ({source}) is empty");
    }

    let mut out = format!("Cart ({source}) - {} item(s)\n", view.item_count);
    for item in &view.items {
        out.push_str(&format!(
            "  {:<24} x{:<4} {:>10} {:>10}\n",
            item.title,
            item.quantity,
            item.price.as_deref().unwrap_or("-"),
            item.line_price,
        ));
    }
    out.push_str(&format!("Subtotal: {}", view.subtotal));
    out
}

#[allow(clippy::print_stdout)]
fn emit(text: &str) {
    println!("{text}");
}

#[allow(clippy::print_stderr)]
fn report(notification: &Notification) {
    match notification.level {
        NotificationLevel::Error => eprintln!("error: {}", notification.message),
        NotificationLevel::Info => eprintln!("{}", notification.message),
    }
}
