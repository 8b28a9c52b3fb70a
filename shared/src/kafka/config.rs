use relay_config::KafkaConfig;
use rdkafka::config::ClientConfig;
use tracing::info;

/// Build the `rdkafka` client configuration for the event producer
///
/// Handles:
/// - Bootstrap servers and client id
/// - SSL/TLS when `ssl_enabled` is set, with an optional CA file
/// - SASL authentication when mechanism, username and password are all present
/// - Producer reliability and batching settings
pub fn create_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.broker_list().join(","))
        .set("client.id", &config.client_id)
        .set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
        if let Some(ca) = &config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca);
        }
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password)
            .set(
                "security.protocol",
                if config.ssl_enabled {
                    "sasl_ssl"
                } else {
                    "sasl_plaintext"
                },
            );
    }

    client_config
        .set("acks", &config.producer_acks)
        .set(
            "enable.idempotence",
            config.producer_enable_idempotence.to_string(),
        )
        .set(
            "max.in.flight.requests.per.connection",
            config.producer_max_in_flight.to_string(),
        )
        .set("compression.type", &config.producer_compression)
        .set("linger.ms", config.producer_linger_ms.to_string())
        .set(
            "request.timeout.ms",
            config.producer_request_timeout_ms.to_string(),
        )
        .set(
            "delivery.timeout.ms",
            config.producer_delivery_timeout_ms.to_string(),
        );

    client_config
}
