//! Stream channel points redemptions for one channel.
//!
//! ```sh
//! cargo run --example channel_points -- <channel_id> <oauth_token>
//! ```

use twitch_pubsub::{ClientEvent, PubSubClient, PubSubConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    const USAGE: &str = "usage: channel_points <channel_id> <oauth_token>";
    let mut args = std::env::args().skip(1);
    let channel_id = args.next().ok_or(USAGE)?;
    let token = args.next().ok_or(USAGE)?;

    let client = PubSubClient::new(PubSubConfig::new())?;
    client.add_channel(&channel_id, &token)?;
    client.connect().await?;
    client.listen_channel_points(&channel_id).await?;
    println!("listening for redemptions on channel {channel_id}");

    let mut events = client.events();
    let mut redemptions = client.redemptions();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::Message { .. }) => {}
                Ok(other) => println!("[event] {other:?}"),
                Err(_) => break,
            },
            redemption = redemptions.recv() => {
                if let Ok(event) = redemption {
                    let redemption = event.redemption.redemption;
                    println!(
                        "{} redeemed '{}' for {} points",
                        redemption.user.display_name,
                        redemption.reward.title,
                        redemption.reward.cost,
                    );
                }
            }
        }
    }
    Ok(())
}
