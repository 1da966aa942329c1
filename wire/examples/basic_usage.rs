//! Basic usage example for the APNs wire formats.

use apns_wire::{BinaryMessage, DeviceToken, ErrorResponse, Payload, Priority};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== APNs Wire Format Example ===\n");

    // 1. Build a notification payload
    println!("1. Building a payload...");
    let mut payload = Payload::new();
    payload.set_alert("Your order has shipped");
    payload.set_badge(1);
    payload.set_sound("default");
    payload.set_priority(Priority::High);
    payload.set_custom("order-id", serde_json::json!(48151))?;

    println!("   JSON: {}", payload.to_json()?);

    // 2. Encode it into a reusable notification frame
    println!("\n2. Encoding the notification frame...");
    let mut message = BinaryMessage::from_payload(&payload)?;
    println!("   Encoded frame size: {} bytes", message.len());

    // 3. Patch the per-device fields
    println!("\n3. Patching identifier and token...");
    let token = DeviceToken::from_hex(&"ab".repeat(32))?;
    message.set_id(7);
    message.set_token(&token);
    println!("   Token: {}", token.to_hex());

    // 4. Parse a gateway error response
    println!("\n4. Parsing an error response...");
    let response = ErrorResponse::parse(&[8, 8, 0, 0, 0, 7])?;
    println!(
        "   Status {} for notification {}",
        response.status, response.identifier
    );

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
