//! Print doorbell, motion and human-detection events from an Amcrest AD410.
//!
//! ```text
//! AD410_URL=http://192.168.1.108 AD410_PASSWORD=secret AMCREST_LOG_MODE=development \
//!     cargo run -p amcrest-api --example doorbell_events
//! ```

use amcrest_api::logging::init_logging_from_env;
use amcrest_api::{AmcrestDevice, CancellationToken, DeviceConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let device = AmcrestDevice::connect(DeviceConfig::from_env()?).await?;
    println!("Serial: {}", device.serial_number());
    println!("Type  : {}", device.device_type());
    println!("{}", device.software_version());

    let cancel = CancellationToken::new();
    let mut events = device.open_reliable_event_stream(10, cancel.clone())?;
    let mut metadata = tokio::time::interval(Duration::from_secs(300));

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    println!("Stream ended, aborting.");
                    break;
                };
                match event.code.as_str() {
                    "VideoMotion" => println!("Motion: {}", event.is_start()),
                    "CrossRegionDetection" => {
                        if event.data_field("Object.ObjectType").as_deref() == Some("Human") {
                            println!("Human: {}", event.is_start());
                        }
                    }
                    "_DoTalkAction_" => {
                        let pressed = event.data_field("Action").as_deref() == Some("Invite");
                        println!("Doorbell: {pressed}");
                    }
                    "NewFile" => println!("New file: {:?}", event.data_field("File")),
                    _ => {}
                }
            }
            _ = metadata.tick() => match device.storage_usage().await {
                Ok(usage) => println!(
                    "Storage: {:.1}% used ({:.2} GiB)",
                    usage.used_percent(),
                    usage.used_gib()
                ),
                Err(e) => eprintln!("Failed to read storage info: {e}"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Received interrupt");
                cancel.cancel();
                break;
            }
        }
    }

    println!("Shutting down... ({:?})", events.join().await?);
    Ok(())
}
