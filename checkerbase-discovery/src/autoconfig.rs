use quick_xml::events::Event;
use quick_xml::Reader;

use crate::model::{Security, ServerConfig, Source, UsernameFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Hostname,
    Port,
    SocketType,
    Username,
}

/// Parses Mozilla's autoconfig XML format, extracting `incomingServer`
/// elements with `type="imap"`. Elements missing `hostname` or with a
/// non-integer `port` are skipped. Malformed XML yields an empty list —
/// callers at the strategy boundary treat this the same as "nothing found".
pub fn parse_autoconfig_xml(xml: &str, source: Source) -> Vec<ServerConfig> {
    parse_inner(xml, source).unwrap_or_default()
}

fn parse_inner(xml: &str, source: Source) -> quick_xml::Result<Vec<ServerConfig>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut configs = Vec::new();

    let mut in_imap_server = false;
    let mut current_field: Option<Field> = None;
    let mut hostname: Option<String> = None;
    let mut port: Option<String> = None;
    let mut socket_type: Option<String> = None;
    let mut username: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,

            Event::Start(start) => {
                let local = start.local_name();
                if local.as_ref() == b"incomingServer" {
                    let is_imap = start
                        .attributes()
                        .flatten()
                        .any(|a| a.key.as_ref() == b"type" && a.value.as_ref() == b"imap");
                    if is_imap {
                        in_imap_server = true;
                        hostname = None;
                        port = None;
                        socket_type = None;
                        username = None;
                    }
                } else if in_imap_server {
                    current_field = match local.as_ref() {
                        b"hostname" => Some(Field::Hostname),
                        b"port" => Some(Field::Port),
                        b"socketType" => Some(Field::SocketType),
                        b"username" => Some(Field::Username),
                        _ => None,
                    };
                }
            }

            Event::Text(text) => {
                if in_imap_server {
                    if let Some(field) = current_field {
                        let value = text.unescape()?.into_owned();
                        match field {
                            Field::Hostname => hostname = Some(value),
                            Field::Port => port = Some(value),
                            Field::SocketType => socket_type = Some(value),
                            Field::Username => username = Some(value),
                        }
                    }
                }
            }

            Event::End(end) => {
                if in_imap_server && end.local_name().as_ref() == b"incomingServer" {
                    in_imap_server = false;
                    if let Some(config) = finish_server(
                        hostname.take(),
                        port.take(),
                        socket_type.take(),
                        username.take(),
                        source,
                    ) {
                        configs.push(config);
                    }
                } else {
                    current_field = None;
                }
            }

            _ => {}
        }
        buf.clear();
    }

    Ok(configs)
}

fn finish_server(
    hostname: Option<String>,
    port: Option<String>,
    socket_type: Option<String>,
    username: Option<String>,
    source: Source,
) -> Option<ServerConfig> {
    let hostname = hostname.filter(|h| !h.trim().is_empty())?;
    let port: u16 = port?.trim().parse().ok()?;

    let security = match socket_type.as_deref() {
        Some("SSL") => Security::Ssl,
        Some("STARTTLS") => Security::Starttls,
        _ => Security::NoSecurity,
    };
    let username_format = match username.as_deref() {
        Some("%EMAILLOCALPART%") => UsernameFormat::LocalPart,
        _ => UsernameFormat::Email,
    };

    Some(ServerConfig::new(hostname, port, security, username_format, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <clientConfig version="1.1">
      <emailProvider id="example.com">
        <incomingServer type="imap">
          <hostname>imap.example.com</hostname>
          <port>993</port>
          <socketType>SSL</socketType>
          <username>%EMAILLOCALPART%</username>
        </incomingServer>
        <incomingServer type="pop3">
          <hostname>pop.example.com</hostname>
          <port>995</port>
          <socketType>SSL</socketType>
          <username>%EMAILADDRESS%</username>
        </incomingServer>
      </emailProvider>
    </clientConfig>
    "#;

    #[test]
    fn extracts_only_imap_servers() {
        let configs = parse_autoconfig_xml(SAMPLE, Source::Ispdb);
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].hostname, "imap.example.com");
        assert_eq!(configs[0].port, 993);
        assert_eq!(configs[0].security, Security::Ssl);
        assert_eq!(configs[0].username_format, UsernameFormat::LocalPart);
        assert_eq!(configs[0].source, Source::Ispdb);
    }

    #[test]
    fn missing_hostname_is_skipped() {
        let xml = r#"<clientConfig><emailProvider><incomingServer type="imap">
            <port>993</port><socketType>SSL</socketType>
        </incomingServer></emailProvider></clientConfig>"#;
        assert!(parse_autoconfig_xml(xml, Source::Ispdb).is_empty());
    }

    #[test]
    fn non_integer_port_is_skipped() {
        let xml = r#"<clientConfig><emailProvider><incomingServer type="imap">
            <hostname>imap.example.com</hostname><port>imap</port>
        </incomingServer></emailProvider></clientConfig>"#;
        assert!(parse_autoconfig_xml(xml, Source::Ispdb).is_empty());
    }

    #[test]
    fn unknown_socket_type_maps_to_no_security() {
        let xml = r#"<clientConfig><emailProvider><incomingServer type="imap">
            <hostname>imap.example.com</hostname><port>143</port><socketType>plain</socketType>
        </incomingServer></emailProvider></clientConfig>"#;
        let configs = parse_autoconfig_xml(xml, Source::Autoconfig);
        assert_eq!(configs[0].security, Security::NoSecurity);
    }

    #[test]
    fn malformed_xml_yields_empty_list() {
        let configs = parse_autoconfig_xml("<clientConfig><unterminated", Source::Ispdb);
        assert!(configs.is_empty());
    }

    #[test]
    fn non_email_username_literal_maps_to_email_format() {
        let xml = r#"<clientConfig><emailProvider><incomingServer type="imap">
            <hostname>imap.example.com</hostname><port>993</port>
            <socketType>STARTTLS</socketType><username>%EMAILADDRESS%</username>
        </incomingServer></emailProvider></clientConfig>"#;
        let configs = parse_autoconfig_xml(xml, Source::Ispdb);
        assert_eq!(configs[0].username_format, UsernameFormat::Email);
        assert_eq!(configs[0].security, Security::Starttls);
    }
}
