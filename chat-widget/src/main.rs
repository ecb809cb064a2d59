//! Terminal front end for the support chat widget.
//!
//! Commands:
//! - `/open`, `/close` - toggle the widget (closing ends the conversation)
//! - `/logout` - end the conversation and clear the transcript
//! - `/quit` - tear the widget down and exit
//!
//! Ctrl-C is treated as the host going away, even mid-question, and ends the
//! conversation with a blocking request.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use shared::{
    BlockingFlush, ChatMessage, ChatWidget, Config, FileCookieStore, HttpBackend, Sender,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn render(message: &ChatMessage) -> Option<String> {
    let prefix = match message.sender {
        Sender::User => "you",
        Sender::Ai if message.is_personalized => "ai*",
        Sender::Ai => "ai",
        Sender::System if message.is_metadata => "  ",
        Sender::System => "system",
        Sender::Loading => return None,
    };
    Some(format!("{}> {}", prefix, message.text()))
}

/// Print messages added since the last call.
fn flush_new(widget: &ChatWidget, shown: &mut usize) {
    let messages = widget.messages();
    if messages.len() < *shown {
        *shown = 0;
    }
    for message in &messages[*shown..] {
        if let Some(line) = render(message) {
            println!("{}", line);
        }
    }
    *shown = messages.len();
}

/// Run `work` unless `interrupt` completes first.
async fn unless_interrupted<W, I>(work: W, interrupt: I) -> Option<W::Output>
where
    W: Future,
    I: Future,
{
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = Config::from_env().context("loading configuration")?;
    info!(
        "Starting widget against {} with key {}",
        config.backend_url,
        config.redacted_api_key()
    );

    let backend = Arc::new(HttpBackend::new(&config)?);
    let cookies = Arc::new(FileCookieStore::open(config.cookie_path()?)?);
    let flush = Arc::new(BlockingFlush::new(&config));

    let mut widget = ChatWidget::new(backend, cookies, flush, config.business_id.clone())
        .with_demo_business_id(config.demo_business_id.clone());

    let mut shown = 0;
    if widget.connect().await {
        widget.load_display().await;
    }
    widget.toggle().await;
    flush_new(&widget, &mut shown);

    println!("== {} ==", widget.display().header());
    if let Some(welcome) = widget.display().welcome_message() {
        println!("ai> {}", welcome);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let Some(line) = unless_interrupted(lines.next_line(), &mut ctrl_c).await else {
            widget.unload();
            break;
        };
        let Some(line) = line? else {
            widget.teardown().await;
            break;
        };

        match line.trim() {
            "/quit" => {
                widget.teardown().await;
                break;
            }
            "/open" | "/close" => {
                let open = widget.toggle().await;
                println!("-- widget {} --", if open { "opened" } else { "closed" });
            }
            "/logout" => {
                widget.logout().await;
                shown = 0;
                println!("-- logged out --");
            }
            text if !widget.is_visible() => {
                if !text.is_empty() {
                    println!("-- widget is closed; /open to chat --");
                }
            }
            text => {
                // The host can go away while a question is in flight.
                if unless_interrupted(widget.send(text), &mut ctrl_c).await.is_none() {
                    widget.unload();
                    break;
                }
            }
        }
        flush_new(&widget, &mut shown);
    }

    Ok(())
}
