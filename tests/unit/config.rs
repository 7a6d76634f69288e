// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use mailbridge::config::{Settings, SettingsError, TlsMode};
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_two_accounts_from_file() {
        let file = config_file(
            r#"
client_name = "bridge-test"

[[accounts]]
name = "work"
host = "imap.work.example"
username = "me@work.example"
password = "hunter2"

[[accounts]]
name = "home"
host = "imap.home.example"
port = 143
username = "me"
password = "pw"
tls = "starttls"
"#,
        );

        let settings = Settings::new(file.path().to_str()).unwrap();
        assert_eq!(settings.client_name, "bridge-test");
        assert_eq!(settings.accounts.len(), 2);

        let work = settings.account("work").unwrap();
        assert_eq!(work.port, 993);
        assert_eq!(work.tls, TlsMode::Tls);

        let home = settings.account("home").unwrap();
        assert_eq!(home.port, 143);
        assert_eq!(home.tls, TlsMode::Starttls);
        assert_ne!(home.masked().password, "pw");
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let file = config_file("[timeouts]\noperation_secs = 30\n");
        env::set_var("MAILBRIDGE__TIMEOUTS__OPERATION_SECS", "12");
        let settings = Settings::new(file.path().to_str());
        env::remove_var("MAILBRIDGE__TIMEOUTS__OPERATION_SECS");

        let settings = settings.unwrap();
        assert_eq!(settings.timeouts.operation_secs, 12);
        assert_eq!(settings.timeouts.teardown_secs, 5);
    }

    #[test]
    #[serial]
    fn test_account_without_host_is_rejected() {
        let file = config_file(
            r#"
[[accounts]]
name = "broken"
host = ""
username = "u"
password = "p"
"#,
        );
        let err = Settings::new(file.path().to_str()).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidAccount(_)));
    }
}
