//! Property-based tests for configuration text round-trips.
//!
//! Random parameter sets are rendered with `Customization::to_text()` and
//! parsed back; the parsed value must equal the original.

use proptest::prelude::*;
use rsmt_core::params::{
    BaudConfig, BaudRateConfig, CommonParams, Cp2103Params, Cp2105Params, DeviceMode,
    DualPortConfig, FamilyParams, FlushBufferConfig, PortConfig, StringValue,
};
use rsmt_core::{Customization, Params, PartNumber, StringEncoding, VidPid};

fn string_value() -> impl Strategy<Value = StringValue> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=255).prop_map(|bytes| StringValue {
            encoding: StringEncoding::Ascii,
            bytes,
        }),
        prop::collection::vec(any::<u8>(), 0..=255).prop_map(|bytes| StringValue {
            encoding: StringEncoding::Unicode,
            bytes,
        }),
    ]
}

fn vid_pid() -> impl Strategy<Value = VidPid> {
    (any::<u16>(), any::<u16>()).prop_map(|(vid, pid)| VidPid::new(vid, pid))
}

fn common_params() -> impl Strategy<Value = CommonParams> {
    (
        prop::option::of(vid_pid()),
        prop::option::of(any::<u8>()),
        prop::option::of(any::<u8>()),
        prop::option::of(any::<u16>()),
        prop::option::of(string_value()),
    )
        .prop_map(
            |(vid_pid, power_mode, max_power, device_version, product_string)| CommonParams {
                vid_pid,
                power_mode,
                max_power,
                device_version,
                product_string,
            },
        )
}

fn baud_rate_config() -> impl Strategy<Value = BaudRateConfig> {
    prop::array::uniform32((any::<u16>(), any::<u16>(), any::<u8>(), any::<u32>())).prop_map(
        |entries| {
            BaudRateConfig(entries.map(|(baud_gen, timer0_reload, prescaler, baud_rate)| {
                BaudConfig {
                    baud_gen,
                    timer0_reload,
                    prescaler,
                    baud_rate,
                }
            }))
        },
    )
}

fn port_config() -> impl Strategy<Value = PortConfig> {
    (any::<u16>(), any::<u16>(), any::<u16>(), any::<u8>()).prop_map(
        |(mode, reset_latch, suspend_latch, enhanced_fxn)| PortConfig {
            mode,
            reset_latch,
            suspend_latch,
            enhanced_fxn,
        },
    )
}

fn cp2103_params() -> impl Strategy<Value = FamilyParams> {
    (prop::option::of(baud_rate_config()), prop::option::of(port_config())).prop_map(
        |(baud_rate_config, port_config)| {
            FamilyParams::Cp2103(Cp2103Params {
                baud_rate_config,
                port_config,
            })
        },
    )
}

fn cp2105_params() -> impl Strategy<Value = FamilyParams> {
    (
        prop::option::of(any::<u16>()),
        prop::option::of((any::<u8>(), any::<u8>())),
        prop::option::of(any::<[u8; 9]>()),
        prop::option::of(string_value()),
        prop::option::of(string_value()),
    )
        .prop_map(|(flush, mode, port, ifc0, ifc1)| {
            let mut p = Cp2105Params {
                flush_buffer_config: flush.map(FlushBufferConfig),
                device_mode: mode.map(|(eci, sci)| DeviceMode { eci, sci }),
                dual_port_config: port.map(|b| DualPortConfig {
                    mode: u16::from_be_bytes([b[0], b[1]]),
                    reset_latch: u16::from_be_bytes([b[2], b[3]]),
                    suspend_latch: u16::from_be_bytes([b[4], b[5]]),
                    enhanced_fxn_eci: b[6],
                    enhanced_fxn_sci: b[7],
                    enhanced_fxn_device: b[8],
                }),
                ..Cp2105Params::default()
            };
            p.interface_strings.0[0] = ifc0;
            p.interface_strings.0[1] = ifc1;
            FamilyParams::Cp2105(p)
        })
}

proptest! {
    /// Rendering then parsing a CP2103 configuration preserves every parameter.
    #[test]
    fn cp2103_text_round_trip(
        filter in vid_pid(),
        common in common_params(),
        family in cp2103_params(),
    ) {
        let original = Customization {
            part: PartNumber::Cp2103,
            filter,
            params: Params { common, family },
        };
        let text = original.to_text();
        let parsed = Customization::parse(&text, false);
        prop_assert!(parsed.is_ok(), "parse failed: {:?}\n{}", parsed, text);
        prop_assert_eq!(parsed.unwrap(), original);
    }

    /// Same for the dual interface part with interface strings.
    #[test]
    fn cp2105_text_round_trip(
        filter in vid_pid(),
        common in common_params(),
        family in cp2105_params(),
    ) {
        let original = Customization {
            part: PartNumber::Cp2105,
            filter,
            params: Params { common, family },
        };
        let text = original.to_text();
        let parsed = Customization::parse(&text, false).unwrap();
        prop_assert_eq!(&parsed, &original);
        // Canonical form is stable
        prop_assert_eq!(parsed.to_text(), text);
    }

    /// Arbitrary whitespace between tokens does not change the result.
    #[test]
    fn whitespace_is_insignificant(
        common in common_params(),
        sep in prop::sample::select(vec![" ", "\n", "\t", "  \r\n  "]),
    ) {
        let original = Customization {
            part: PartNumber::Cp2101,
            filter: VidPid::new(0x10c4, 0xea60),
            params: Params { common, family: FamilyParams::Cp2101 },
        };
        let text = original.to_text();
        let respaced = text.split_whitespace().collect::<Vec<_>>().join(sep);
        prop_assert_eq!(Customization::parse(&respaced, false).unwrap(), original);
    }
}
