//! Host-level tests for the soft-AP identity and credentials.

use std::net::Ipv4Addr;

use alarm_portal::Error;
use alarm_portal::ap_config::{AP_PASS, AP_SSID, ApCredentials, ApIdentity, POOL_SIZE};

#[test]
fn default_identity_is_the_pico_soft_ap() {
    let identity = ApIdentity::default();
    assert_eq!(identity.gateway(), Ipv4Addr::new(192, 168, 4, 1));
    assert_eq!(identity.netmask(), Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(identity.base_octet(), 16);
}

#[test]
fn pool_maps_slots_to_consecutive_addresses() {
    let identity = ApIdentity::DEFAULT;
    assert_eq!(
        identity.pool_address(0),
        Some(Ipv4Addr::new(192, 168, 4, 16))
    );
    assert_eq!(
        identity.pool_address(POOL_SIZE - 1),
        Some(Ipv4Addr::new(192, 168, 4, 23))
    );
    assert_eq!(identity.pool_address(POOL_SIZE), None);

    for slot in 0..POOL_SIZE {
        let ip = identity.pool_address(slot).unwrap();
        assert_eq!(identity.pool_slot(ip), Some(slot));
    }
    assert_eq!(identity.pool_slot(Ipv4Addr::new(192, 168, 4, 15)), None);
    assert_eq!(identity.pool_slot(Ipv4Addr::new(192, 168, 4, 24)), None);
    assert_eq!(identity.pool_slot(Ipv4Addr::new(10, 0, 0, 16)), None);
}

#[test]
fn credentials_enforce_wpa2_lengths() {
    let ssid = "PICO_ALARME_AP";
    assert!(ApCredentials::new(ssid, "picoalarme123").is_ok());
    assert!(ApCredentials::new("x", "12345678").is_ok());
    assert!(matches!(
        ApCredentials::new("", "12345678"),
        Err(Error::InvalidSsid { len: 0 })
    ));
    assert!(matches!(
        ApCredentials::new("123456789012345678901234567890123", "12345678"),
        Err(Error::InvalidSsid { len: 33 })
    ));
    assert!(matches!(
        ApCredentials::new("ap", "1234567"),
        Err(Error::InvalidPassphrase { len: 7 })
    ));
    let long = "p".repeat(64).leak();
    assert!(matches!(
        ApCredentials::new("ap", long),
        Err(Error::InvalidPassphrase { len: 64 })
    ));
}

#[test]
fn build_credentials_are_usable() {
    let credentials = ApCredentials::from_build_env().unwrap();
    assert_eq!(credentials.ssid(), AP_SSID);
    assert_eq!(credentials.passphrase(), AP_PASS);
}
