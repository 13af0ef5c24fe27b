/*!
Parser for `key=value` audit records describing deletions

Audit output is one record per line, for example:

```text
type=SYSCALL msg=audit(1697725262.123:456): arch=c000003e syscall=263 success=yes uid=1000 comm="rm" key="file_delete"
type=PATH msg=audit(1697725262.123:456): item=1 name="/data/project/report.txt" mode=0100644 ouid=1000 nametype=DELETE
```

Only delete-tagged records become events. A record that lacks a field still
produces an event with that field unset, so one bad line never hides the
rest of the batch.
*/

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::event::DeletionEvent;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// One `key=value` token of a record line
#[derive(Debug, Clone, PartialEq)]
struct Field<'a> {
    key: &'a str,
    value: String,
    quoted: bool,
}

/// A tokenized record line
#[derive(Debug)]
struct Record<'a> {
    fields: Vec<Field<'a>>,
}

impl<'a> Record<'a> {
    fn parse(line: &'a str) -> Self {
        let mut fields = Vec::new();
        let mut rest = line.trim_start();

        while !rest.is_empty() {
            let key_end = rest
                .find(|c: char| c.is_whitespace() || c == '=')
                .unwrap_or(rest.len());
            let key = &rest[..key_end];
            rest = &rest[key_end..];

            if let Some(after_eq) = rest.strip_prefix('=') {
                let (value, quoted, remainder) = read_value(after_eq);
                if !key.is_empty() {
                    fields.push(Field { key, value, quoted });
                }
                rest = remainder;
            }
            rest = rest.trim_start();
        }

        Self { fields }
    }

    fn get(&self, key: &str) -> Option<&Field<'a>> {
        self.fields.iter().find(|field| field.key == key)
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|field| field.value.as_str())
    }

    fn is_delete(&self) -> bool {
        self.fields
            .iter()
            .any(|field| matches!(field.key, "nametype" | "type") && field.value == "DELETE")
    }

    fn is_syscall(&self) -> bool {
        self.value("type") == Some("SYSCALL")
    }

    /// Record id and occurrence time from the `msg=audit(<secs>.<millis>:<serial>):` marker
    fn marker(&self) -> Option<(String, Option<DateTime<Utc>>)> {
        let raw = self.value("msg")?;
        let open = raw.find('(')?;
        let close = raw[open..].find(')')? + open;
        let id = raw[open + 1..close].trim();
        if id.is_empty() {
            return None;
        }

        let timestamp = id.split(':').next().and_then(parse_epoch);
        Some((id.to_string(), timestamp))
    }

    /// Position of a PATH item within its syscall, when reported
    fn item(&self) -> Option<&str> {
        self.value("item")
            .filter(|item| !item.is_empty() && item.bytes().all(|b| b.is_ascii_digit()))
    }

    fn uid(&self) -> Option<String> {
        let uid = self.value("uid")?;
        if !uid.is_empty() && uid.bytes().all(|b| b.is_ascii_digit()) {
            Some(uid.to_string())
        } else {
            None
        }
    }

    fn name(&self) -> Option<String> {
        let field = self.get("name")?;
        if field.quoted {
            return Some(field.value.clone()).filter(|name| !name.is_empty());
        }
        match field.value.as_str() {
            "" | "(null)" => None,
            value => Some(decode_hex(value).unwrap_or_else(|| value.to_string())),
        }
    }

    fn is_directory(&self) -> Option<bool> {
        let mode = u32::from_str_radix(self.value("mode")?, 8).ok()?;
        Some(mode & S_IFMT == S_IFDIR)
    }
}

/// Reads one value, honouring double or single quotes. Returns the value,
/// whether it was quoted, and the unconsumed remainder of the line.
fn read_value(input: &str) -> (String, bool, &str) {
    if let Some(quote) = input.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body = &input[1..];
        return match body.find(quote) {
            Some(end) => (body[..end].to_string(), true, &body[end + 1..]),
            None => (body.to_string(), true, ""),
        };
    }

    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    (input[..end].to_string(), false, &input[end..])
}

/// auditd hex-encodes names containing spaces or control characters
fn decode_hex(value: &str) -> Option<String> {
    if value.len() < 2 || value.len() % 2 != 0 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let bytes = (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// `<secs>.<fraction>`, where the fraction is decimal (`12.5` is 12.500s)
fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let secs: i64 = secs.parse().ok()?;

    let digits = fraction.get(..3).unwrap_or(fraction);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: u32 = format!("{:0<3}", digits).parse().ok()?;
    DateTime::from_timestamp(secs, millis * 1_000_000)
}

/// Extracts deletion events from raw audit text, most recent first.
///
/// Returns an empty vec when the text holds no delete-tagged records.
pub fn parse_deletions(raw: &str) -> Vec<DeletionEvent> {
    let records: Vec<Record<'_>> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Record::parse)
        .collect();

    // The acting uid normally lives on the SYSCALL record of the same event
    let syscall_uids: HashMap<String, String> = records
        .iter()
        .filter(|record| record.is_syscall())
        .filter_map(|record| Some((record.marker()?.0, record.uid()?)))
        .collect();

    let mut events = Vec::new();
    for record in records.iter().rev().filter(|record| record.is_delete()) {
        let marker = record.marker();
        let serial = marker.as_ref().map(|(id, _)| id.as_str());
        // one syscall can remove several names, told apart by their item number
        let event_id = serial.map(|serial| match record.item() {
            Some(item) => format!("{}#{}", serial, item),
            None => serial.to_string(),
        });

        let path = record.name();
        let user_id = record
            .uid()
            .or_else(|| serial.and_then(|serial| syscall_uids.get(serial)).cloned());
        let timestamp = marker.as_ref().and_then(|(_, ts)| *ts).unwrap_or_else(Utc::now);
        let is_directory = path.as_ref().and_then(|_| record.is_directory());

        let mut missing = Vec::new();
        if event_id.is_none() {
            missing.push("event id");
        }
        if path.is_none() {
            missing.push("name");
        }
        if user_id.is_none() {
            missing.push("uid");
        }
        if !missing.is_empty() {
            warn!("Partial delete record, missing {}", missing.join(", "));
        }

        events.push(DeletionEvent {
            event_id,
            path,
            is_directory,
            user_id,
            user_name: None,
            timestamp,
        });
    }

    debug!("Parsed {} delete records", events.len());
    events
}
