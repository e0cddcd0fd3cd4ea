//! Example: Connect to a receiver and print every state change.

use denon_avr_net::{AvrClient, AvrConfig, AvrEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "192.168.0.50".to_string());
    let config = AvrConfig::builder().host(host).port(23).build();

    let client = AvrClient::new(config)?;

    client.add_state_listener(|key, value| {
        println!("  {key:20} = {value}");
        Ok(())
    });

    let mut events = client.subscribe();
    client.start()?;

    println!("Listening for updates... (Ctrl+C to exit)");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(AvrEvent::Connected) => println!("--- connected ---"),
                Ok(AvrEvent::Disconnected) => println!("--- disconnected ---"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    println!("(missed {n} events)");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let mut states: Vec<_> = client.states().into_iter().collect();
    states.sort();
    println!("\n--- Final state ({}) ---", states.len());
    for (key, value) in states {
        println!("  {key:20} = {value}");
    }

    client.stop().await;
    Ok(())
}
