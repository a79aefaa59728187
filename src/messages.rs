//! CSTA XML request bodies used by the sample session.
//!
//! The client treats these as opaque strings; they are built here from the
//! switch/station settings.

use std::path::Path;

/// Cross-reference id sent in MonitorStop when none was learned from MonitorStart.
pub const DEFAULT_MONITOR_CROSS_REF_ID: &str = "1111111";

const ECMA_323_ED3: &str = "http://www.ecma-international.org/standards/ecma-323/csta/ed3";
const AVAYA_CSTA: &str = "http://www.avaya.com/csta";

/// Reads the StartApplicationSession request from an XML template file.
pub fn load_template(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}

/// Device identifier in `extension:switchConn:switch:instance` form.
pub fn device_id(
    extension: &str,
    switch_conn_name: &str,
    switch_name: &str,
    instance: u8,
) -> String {
    format!(
        "{}:{}:{}:{}",
        extension, switch_conn_name, switch_name, instance
    )
}

pub fn get_device_id(switch_name: &str, extension: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><GetDeviceId xmlns="{ns}"><switchName>{switch}</switchName><extension>{ext}</extension></GetDeviceId>"#,
        ns = AVAYA_CSTA,
        switch = escape(switch_name),
        ext = escape(extension),
    )
}

/// MonitorStart for physical device events (display, hookswitch, lamp, ringer)
/// plus link and registration private events.
pub fn monitor_start(switch_conn_name: &str, switch_name: &str, extension: &str) -> String {
    let device = escape(&device_id(extension, switch_conn_name, switch_name, 0));
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MonitorStart xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns="{ecma}">
    <monitorObject>
        <deviceObject typeOfNumber="other" mediaClass="notKnown">{device}</deviceObject>
    </monitorObject>
    <requestedMonitorFilter>
        <physicalDeviceFeature>
            <displayUpdated>true</displayUpdated>
            <hookswitch>true</hookswitch>
            <lampMode>true</lampMode>
            <ringerStatus>true</ringerStatus>
        </physicalDeviceFeature>
    </requestedMonitorFilter>
    <extensions>
        <privateData>
            <private>
                <AvayaEvents xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns="">
                    <invertFilter xmlns="{avaya}">true</invertFilter>
                    <terminalUnregisteredEvent xmlns="{avaya}">
                        <unregistered>true</unregistered>
                        <reregistered>true</reregistered>
                    </terminalUnregisteredEvent>
                    <physicalDeviceFeaturesPrivateEvents xmlns="{avaya}">
                        <serviceLinkStatusChanged>true</serviceLinkStatusChanged>
                    </physicalDeviceFeaturesPrivateEvents>
                </AvayaEvents>
            </private>
        </privateData>
    </extensions>
</MonitorStart>
"#,
        ecma = ECMA_323_ED3,
        avaya = AVAYA_CSTA,
        device = device,
    )
}

pub fn monitor_stop(monitor_cross_ref_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MonitorStop xmlns="{ns}">
<monitorCrossRefID>{id}</monitorCrossRefID>
</MonitorStop>
"#,
        ns = AVAYA_CSTA,
        id = escape(monitor_cross_ref_id),
    )
}

/// SnapshotDevice including station status.
pub fn snapshot_device(switch_conn_name: &str, switch_name: &str, extension: &str) -> String {
    let device = escape(&device_id(extension, switch_conn_name, switch_name, 1));
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<SnapshotDevice xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns="{ecma}">
<snapshotObject>{device}</snapshotObject>
<extensions>
<privateData>
<private>
<SnapshotDevicePrivateData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns="{avaya}">
<getStationStatus>true</getStationStatus>
</SnapshotDevicePrivateData>
</private>
</privateData>
</extensions>
</SnapshotDevice>
"#,
        ecma = ECMA_323_ED3,
        avaya = AVAYA_CSTA,
        device = device,
    )
}

/// Pulls the `monitorCrossRefID` text out of a MonitorStart response.
pub fn monitor_cross_ref_id(response: &str) -> Option<&str> {
    const OPEN: &str = "<monitorCrossRefID>";
    const CLOSE: &str = "</monitorCrossRefID>";

    let start = response.find(OPEN)? + OPEN.len();
    let len = response[start..].find(CLOSE)?;
    let id = response[start..start + len].trim();
    (!id.is_empty()).then_some(id)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
