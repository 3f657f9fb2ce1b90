//! A tour of every namespace.
//!
//! Run with: NEMATI_API_KEY=... cargo run --example quickstart

use futures::StreamExt;
use nemati::resources::{
    ChatMessage, ChatRequest, ImageRequest, TrendSearch, WriterRequest, YoutubeSearch,
};
use nemati::Client;
use serde_json::{json, Map};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = Client::from_env()?;

    // Chat
    let response = client
        .chat()
        .create(
            &ChatRequest::new(vec![
                ChatMessage::system("You are a helpful assistant."),
                ChatMessage::user("What is machine learning?"),
            ])
            .model("gpt-4")
            .max_tokens(500),
        )
        .await?;
    println!("{}\nTokens used: {}\n", response.content, response.usage.total());

    // Writer
    let content = client
        .writer()
        .generate(
            &WriterRequest::prompt("Write a product description for a smart home assistant")
                .content_type("product_description")
                .tone("professional")
                .max_tokens(300),
        )
        .await?;
    println!("{}\nWord count: {}\n", content.text, content.word_count);

    let mut templates = std::pin::pin!(client.writer().templates().list()?.into_items().take(5));
    let mut first = None;
    while let Some(template) = templates.next().await {
        let template = template?;
        println!("  - {}: {}", template.id, template.name);
        first.get_or_insert(template.id);
    }
    if let Some(id) = first {
        let mut vars = Map::new();
        vars.insert("topic".into(), json!("AI in healthcare"));
        let content = client.writer().templates().generate(&id, vars).await?;
        println!("\nGenerated from template:\n{}\n", content.text);
    }

    // Image
    let image = client
        .image()
        .generate(
            &ImageRequest::new("A serene mountain lake at sunset, photorealistic")
                .size("1024x1024")
                .quality("hd"),
        )
        .await?;
    match image.url.as_deref() {
        Some(url) => println!("Image URL: {url}\n"),
        None => {
            image.save("mountain_lake.png")?;
            println!("Image saved to mountain_lake.png\n");
        }
    }

    // Trends
    let trends = client
        .trends()
        .search(
            &TrendSearch::new("artificial intelligence")
                .platform("youtube")
                .platform("reddit")
                .timeframe("7d")
                .limit(10),
        )
        .await?;
    for trend in trends.items.iter().take(5) {
        println!("  [{}] {}", trend.platform, trend.title);
    }
    let videos = client
        .trends()
        .youtube()
        .search(
            &YoutubeSearch::new("programming tutorials")
                .timeframe("30d")
                .sort_by("views"),
        )
        .await?;
    for video in videos.iter().take(5) {
        println!("  - {} ({} views)", video.title, video.views);
    }

    // Market
    let stock = client.market().stocks().get("AAPL").await?;
    println!("\nAAPL ${} ({}%)", stock.price, stock.change_percent);
    let btc = client.market().crypto().get("BTC").await?;
    println!("BTC ${:.2} ({}% 24h)", btc.price, btc.change_percent_24h);

    // Account
    let account = client.account().me().await?;
    let credits = client.account().credits().await?;
    println!(
        "\n{} on {}: {}/{} credits",
        account.email, account.plan.name, credits.remaining, credits.total
    );

    Ok(())
}
