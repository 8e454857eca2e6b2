use anyhow::Result;
use clap::Parser;
use colored::*;
use sse_client::{
    ConnectionState, ConnectionStatus, ConsumerConfig, Event, StreamConsumer, Topic, TopicFeed,
};

#[derive(Parser)]
#[command(name = "sse-watch")]
#[command(about = "Watch live photo updates from the school photo feed")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long, env = "PHOTO_FEED_URL", default_value = "http://localhost:4000")]
    base_url: String,

    /// Only show events for this school id (default: all schools)
    #[arg(long)]
    school: Option<String>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

fn print_event(event: &Event) {
    println!(
        "{} {} {} {}",
        event.timestamp.format("%H:%M:%S").to_string().dimmed(),
        event.kind.to_string().bright_white().bold(),
        event.topic.to_string().cyan(),
        event.data
    );
}

fn print_status(status: &ConnectionStatus) {
    if status.is_connected {
        println!("{} Live", "✓".green());
    } else if status.reconnect_attempts > 0 {
        println!(
            "{} Offline, reconnect attempt {}",
            "→".yellow(),
            status.reconnect_attempts
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    let topic = match cli.school {
        Some(id) => Topic::Entity(id),
        None => Topic::All,
    };

    println!(
        "{} Watching {} at {}",
        "→".blue(),
        topic.to_string().cyan(),
        cli.base_url
    );

    let consumer = StreamConsumer::new(ConsumerConfig::new(cli.base_url));
    let mut feed = TopicFeed::new(&consumer, topic);
    let mut status = consumer.status_updates();
    let mut gave_up = false;

    loop {
        tokio::select! {
            event = feed.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                print_status(&current);
                if consumer.state() == ConnectionState::GaveUp {
                    gave_up = true;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(feed);
    consumer.disconnect();

    if gave_up {
        anyhow::bail!("Event stream unavailable, giving up");
    }

    println!("\n{}", "Stopped.".bright_white().bold());
    Ok(())
}
