//! Full-pipeline tests: capture text in, decode-stream lines out.

use rpa_analyzer::{Analyzer, AnalyzerError};
use rpa_capture_reader::{CaptureInput, DumpReader, PacketStream, swizzle, util};
use rpa_decoder::ParserError;
use rpa_decoder::command_handler::{HandleCommand, NullCommandHandler};
use rpa_decoder::emit::{BufferEmitter, EmitSignal};
use rpa_decoder::param::DecodedValue;
use rpa_decoder::protocol::ACK;

const MAGIC: u8 = 0x88;

/// Frame a host payload: swizzle, prefix the checksum, format the record
fn host_line(payload: &[u8]) -> String {
    let swizzled: Vec<u8> = payload
        .iter()
        .map(|byte| swizzle::swizzle_byte(*byte, MAGIC))
        .collect();
    let mut framed = swizzle::checksum(&swizzled).to_be_bytes().to_vec();
    framed.extend_from_slice(&swizzled);
    format!(
        "0.000100\t50200,52413\t{}\t{}",
        framed.len() + 8,
        util::to_hex(&framed)
    )
}

fn reply_line(payload: &[u8]) -> String {
    format!(
        "0.000100\t52413,40200\t{}\t{}",
        payload.len() + 8,
        util::to_hex(payload)
    )
}

/// The wire form of an ACK handshake under the test magic
fn ack_line() -> String {
    reply_line(&[swizzle::swizzle_byte(ACK, MAGIC)])
}

fn stream_over(lines: &[String], magic: Option<u8>) -> PacketStream {
    let mut stream = PacketStream::new(DumpReader::new(CaptureInput::from_text(lines.join("\n"))));
    stream.init_magic(magic).unwrap();
    stream
}

fn decode(lines: &[String], out: &mut BufferEmitter) -> rpa_analyzer::Summary {
    let stream = stream_over(lines, Some(MAGIC));
    let mut handler = NullCommandHandler;
    Analyzer::new(stream, out, &mut handler).run().unwrap()
}

#[test]
fn minimal_command_produces_a_numbered_parser_line() {
    let mut out = BufferEmitter::default();
    decode(&[host_line(&[0xD7])], &mut out);
    assert!(
        out.lines
            .contains(&"0001:000001:001:PRT:PRS:-->:EOF".to_string()),
        "lines: {:#?}",
        out.lines
    );
}

#[test]
fn magic_is_discovered_from_the_wire_ack() {
    let lines = [host_line(&[0xD7]), ack_line()];
    let stream = stream_over(&lines, None);
    assert_eq!(stream.magic(), Some(MAGIC));

    let mut out = BufferEmitter::default();
    let mut handler = NullCommandHandler;
    let summary = Analyzer::new(stream, &mut out, &mut handler).run().unwrap();
    assert!(out.contains("PRT:PRS:-->:EOF"));
    assert!(out.contains("SHK:000:ACK"));
    assert_eq!(summary.commands, 1);
    assert_eq!(summary.acks_outstanding, 0);
}

#[test]
fn checksum_mismatch_logs_an_error_and_decoding_continues() {
    let mut bad = host_line(&[0xD7]);
    let tab = bad.rfind('\t').unwrap();
    bad.replace_range(tab + 1..tab + 3, "ee");

    let mut out = BufferEmitter::default();
    let summary = decode(&[bad, host_line(&[0xEB])], &mut out);
    assert!(out.contains("PRT:ERR:-->:Checksum mismatch"));
    // Both packets still decode.
    assert!(out.contains("EOF"));
    assert!(out.contains("FINISH"));
    assert_eq!(summary.commands, 2);
}

#[test]
fn strict_mode_stops_on_the_first_transport_error() {
    let mut bad = host_line(&[0xD7]);
    let tab = bad.rfind('\t').unwrap();
    bad.replace_range(tab + 1..tab + 3, "ee");

    let stream = stream_over(&[bad, host_line(&[0xEB])], Some(MAGIC));
    let mut out = BufferEmitter::strict();
    let mut handler = NullCommandHandler;
    let err = Analyzer::new(stream, &mut out, &mut handler)
        .run()
        .unwrap_err();
    assert!(matches!(err, AnalyzerError::Signal(EmitSignal::Stopped(_))));
    assert!(!err.is_interrupt());
    assert!(!out.contains("FINISH"));
}

#[test]
fn memory_read_round_trip_through_the_pipeline() {
    /// Records the memory callback
    #[derive(Default)]
    struct MemorySpy {
        seen: Vec<(u8, u8, String, Vec<DecodedValue>)>,
    }
    impl HandleCommand for MemorySpy {
        type Error = core::convert::Infallible;
        fn on_memory(
            &mut self,
            address_msb: u8,
            address_lsb: u8,
            label: &str,
            values: &[DecodedValue],
        ) -> Result<(), Self::Error> {
            self.seen
                .push((address_msb, address_lsb, label.to_string(), values.to_vec()));
            Ok(())
        }
    }

    let lines = [
        host_line(&[0xDA, 0x00, 0x00, 0x26]),
        ack_line(),
        // Reply echoes the command and address, then 1_200_000um.
        reply_line(&[0xDA, 0x00, 0x00, 0x26, 0x00, 0x00, 0x49, 0x1F, 0x00]),
    ];
    let stream = stream_over(&lines, Some(MAGIC));
    let mut out = BufferEmitter::default();
    let mut handler = MemorySpy::default();
    let summary = Analyzer::new(stream, &mut out, &mut handler).run().unwrap();

    assert!(out.contains("PRT:PRS:-->:GET_SETTING Addr:0026"));
    assert!(out.contains("PRT:PRS:<--:MEM_RESULT Addr:0026:Axis Range 1:Reply=1200000um"));
    assert!(out.contains("SHK:000:Reply data"));
    assert_eq!(summary.commands, 2);
    assert_eq!(handler.seen.len(), 1);
    assert_eq!(handler.seen[0].0, 0x00);
    assert_eq!(handler.seen[0].1, 0x26);
    assert_eq!(handler.seen[0].2, "Axis Range 1");
    assert_eq!(handler.seen[0].3, vec![DecodedValue::Int(1_200_000)]);
}

#[test]
fn unknown_opcode_resyncs_without_losing_later_commands() {
    let mut out = BufferEmitter::default();
    let summary = decode(&[host_line(&[0xFE, 0x00, 0xD7])], &mut out);
    assert!(out.contains("INT:CRT"));
    assert!(out.contains("0xFE"));
    assert!(out.contains("PRT:PRS:-->:EOF"));
    assert_eq!(summary.commands, 1);
}

#[test]
fn nak_leaves_the_acknowledgement_outstanding() {
    let nak_line = reply_line(&[swizzle::swizzle_byte(0xCF, MAGIC)]);
    let mut out = BufferEmitter::default();
    let summary = decode(&[host_line(&[0xD7]), nak_line], &mut out);
    assert!(out.contains("SHK:001:Expecting ACK"));
    assert!(out.contains("SHK:001:NAK"));
    assert_eq!(summary.acks_outstanding, 1);
    assert!(out.contains("1 acknowledgements still outstanding"));
}

#[test]
fn unexpected_reply_byte_is_an_error_but_not_fatal() {
    // 0x11 deswizzles to something outside the handshake set.
    let mut out = BufferEmitter::default();
    let summary = decode(&[host_line(&[0xD7]), reply_line(&[0x11])], &mut out);
    assert!(out.contains("Unexpected reply byte"));
    assert_eq!(summary.commands, 1);
}

#[test]
fn handler_errors_unwind_through_the_analyzer() {
    /// Fails on the first command
    #[derive(Debug, Default)]
    struct Fails;
    #[derive(Debug, thiserror::Error)]
    #[error("observer gave up")]
    struct GaveUp;
    impl HandleCommand for Fails {
        type Error = GaveUp;
        fn on_command(
            &mut self,
            _cmd_id: u64,
            _label: &str,
            _command: u8,
            _sub_command: Option<u8>,
            _values: &[DecodedValue],
        ) -> Result<(), Self::Error> {
            Err(GaveUp)
        }
    }

    let stream = stream_over(&[host_line(&[0xD7])], Some(MAGIC));
    let mut out = BufferEmitter::default();
    let mut handler = Fails;
    let err = Analyzer::new(stream, &mut out, &mut handler)
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        AnalyzerError::Parser(ParserError::Handler(GaveUp))
    ));
}

#[test]
fn summary_reports_traffic_totals() {
    let mut out = BufferEmitter::default();
    let summary = decode(&[host_line(&[0xD7]), ack_line()], &mut out);
    assert_eq!(summary.stats.host_packets, 1);
    assert_eq!(summary.stats.host_bytes, 1);
    assert_eq!(summary.stats.reply_packets, 1);
    assert_eq!(summary.stats.reply_bytes, 1);
    assert!(out.contains("host: 1 packets / 1 bytes"));
}
