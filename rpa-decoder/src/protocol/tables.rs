//! The Ruida opcode, reply and memory tables.
//!
//! Command labels and shapes follow the protocol information collected by
//! tatarize at <https://edutechwiki.unige.ch/en/Ruida>. Sub-commands whose
//! meaning is not documented keep a hex label and an undecoded (`Tbd`)
//! payload so captures still show the bytes; decoding them is data
//! discovery work, not a parser error.
//!
//! Tables are sorted by key; lookups binary-search. A structural test at
//! the bottom of this file enforces the shape rules the parser relies on.

use super::{CommandSpec, DecoderKind, MemoryEntry, Node, Param, PrimSpec, PrimType};

const fn prim(name: &'static str, kind: DecoderKind, ty: PrimType) -> Param {
    Param::Prim(PrimSpec { name, kind, ty })
}

const fn um35(name: &'static str) -> Param {
    prim(name, DecoderKind::Um, PrimType::Int35)
}

const fn um14(name: &'static str) -> Param {
    prim(name, DecoderKind::Um, PrimType::Int14)
}

const fn power(name: &'static str) -> Param {
    prim(name, DecoderKind::Power, PrimType::Uint14)
}

const fn speed(name: &'static str) -> Param {
    prim(name, DecoderKind::Speed, PrimType::Int35)
}

const fn time(name: &'static str) -> Param {
    prim(name, DecoderKind::TimeMs, PrimType::Int35)
}

const fn uint7(name: &'static str) -> Param {
    prim(name, DecoderKind::Uint, PrimType::Uint7)
}

const fn uint14(name: &'static str) -> Param {
    prim(name, DecoderKind::Uint, PrimType::Uint14)
}

const fn uint35(name: &'static str) -> Param {
    prim(name, DecoderKind::Uint, PrimType::Uint35)
}

const fn on_off(name: &'static str) -> Param {
    prim(name, DecoderKind::OnOff, PrimType::Bool7)
}

const fn cstring(name: &'static str) -> Param {
    prim(name, DecoderKind::CString, PrimType::CString)
}

const fn tbd(name: &'static str) -> Param {
    prim(name, DecoderKind::Tbd, PrimType::Tbd)
}

const fn rapid_option() -> Param {
    prim("Option", DecoderKind::RapidOption, PrimType::Uint7)
}

const fn spec(label: &'static str, params: &'static [Param]) -> CommandSpec {
    CommandSpec { label, params }
}

// Axis moves (0x80)

static AXIS_X_MOVE: CommandSpec = spec("AXIS_X_MOVE", &[um35("X")]);
static AXIS_Y_MOVE: CommandSpec = spec("AXIS_Y_MOVE", &[um35("Y")]);

static AXIS_MOVE: &[(u8, Node)] = &[
    (0x00, Node::Spec(&AXIS_X_MOVE)),
    (0x08, Node::Spec(&AXIS_Y_MOVE)),
];

// Moves and cuts

static MOVE_ABS_XY: CommandSpec = spec("MOVE_ABS_XY", &[um35("X"), um35("Y")]);
static MOVE_REL_XY: CommandSpec = spec("MOVE_REL_XY", &[um14("X"), um14("Y")]);
static MOVE_REL_X: CommandSpec = spec("MOVE_REL_X", &[um14("X")]);
static MOVE_REL_Y: CommandSpec = spec("MOVE_REL_Y", &[um14("Y")]);
static CUT_ABS_XY: CommandSpec = spec("CUT_ABS_XY", &[um35("X"), um35("Y")]);
static CUT_REL_XY: CommandSpec = spec("CUT_REL_XY", &[um14("X"), um14("Y")]);
static CUT_REL_X: CommandSpec = spec("CUT_REL_X", &[um14("X")]);
static CUT_REL_Y: CommandSpec = spec("CUT_REL_Y", &[um14("Y")]);

// Power group (0xC6)

static MIN_POWER_1: CommandSpec = spec("MIN_POWER_1", &[power("Power")]);
static MAX_POWER_1: CommandSpec = spec("MAX_POWER_1", &[power("Power")]);
static MIN_POWER_2: CommandSpec = spec("MIN_POWER_2", &[power("Power")]);
static MAX_POWER_2: CommandSpec = spec("MAX_POWER_2", &[power("Power")]);
static MIN_POWER_3: CommandSpec = spec("MIN_POWER_3", &[power("Power")]);
static MAX_POWER_3: CommandSpec = spec("MAX_POWER_3", &[power("Power")]);
static LASER_INTERVAL: CommandSpec = spec("LASER_INTERVAL", &[time("Interval")]);
static ADD_DELAY: CommandSpec = spec("ADD_DELAY", &[time("Delay")]);
static LASER_ON_DELAY: CommandSpec = spec("LASER_ON_DELAY", &[time("Delay")]);
static LASER_OFF_DELAY: CommandSpec = spec("LASER_OFF_DELAY", &[time("Delay")]);
static LASER_ON_DELAY_2: CommandSpec = spec("LASER_ON_DELAY_2", &[time("Delay")]);
static LASER_OFF_DELAY_2: CommandSpec = spec("LASER_OFF_DELAY_2", &[time("Delay")]);
static MIN_POWER_1_PART: CommandSpec =
    spec("MIN_POWER_1_PART", &[uint7("Part"), power("Power")]);
static MAX_POWER_1_PART: CommandSpec =
    spec("MAX_POWER_1_PART", &[uint7("Part"), power("Power")]);
static MIN_POWER_2_PART: CommandSpec =
    spec("MIN_POWER_2_PART", &[uint7("Part"), power("Power")]);
static MAX_POWER_2_PART: CommandSpec =
    spec("MAX_POWER_2_PART", &[uint7("Part"), power("Power")]);
static THROUGH_POWER_1: CommandSpec = spec("THROUGH_POWER_1", &[power("Power")]);
static THROUGH_POWER_2: CommandSpec = spec("THROUGH_POWER_2", &[power("Power")]);
static THROUGH_POWER_3: CommandSpec = spec("THROUGH_POWER_3", &[power("Power")]);
static THROUGH_POWER_4: CommandSpec = spec("THROUGH_POWER_4", &[power("Power")]);

static POWER: &[(u8, Node)] = &[
    (0x01, Node::Spec(&MIN_POWER_1)),
    (0x02, Node::Spec(&MAX_POWER_1)),
    (0x05, Node::Spec(&MIN_POWER_2)),
    (0x06, Node::Spec(&MAX_POWER_2)),
    (0x07, Node::Spec(&MIN_POWER_3)),
    (0x08, Node::Spec(&MAX_POWER_3)),
    (0x10, Node::Spec(&LASER_INTERVAL)),
    (0x11, Node::Spec(&ADD_DELAY)),
    (0x12, Node::Spec(&LASER_ON_DELAY)),
    (0x13, Node::Spec(&LASER_OFF_DELAY)),
    (0x15, Node::Spec(&LASER_ON_DELAY_2)),
    (0x16, Node::Spec(&LASER_OFF_DELAY_2)),
    (0x31, Node::Spec(&MIN_POWER_1_PART)),
    (0x32, Node::Spec(&MAX_POWER_1_PART)),
    (0x41, Node::Spec(&MIN_POWER_2_PART)),
    (0x42, Node::Spec(&MAX_POWER_2_PART)),
    (0x50, Node::Spec(&THROUGH_POWER_1)),
    (0x51, Node::Spec(&THROUGH_POWER_2)),
    (0x55, Node::Spec(&THROUGH_POWER_3)),
    (0x56, Node::Spec(&THROUGH_POWER_4)),
];

static IMD_POWER_1: CommandSpec = spec("IMD_POWER_1", &[power("Power")]);
static END_POWER_1: CommandSpec = spec("END_POWER_1", &[power("Power")]);

// Speed group (0xC9)

static SPEED_LASER_1: CommandSpec = spec("SPEED_LASER_1", &[speed("Speed")]);
static SPEED_AXIS: CommandSpec = spec("SPEED_AXIS", &[speed("Speed")]);
static SPEED_LASER_1_PART: CommandSpec =
    spec("SPEED_LASER_1_PART", &[uint7("Part"), speed("Speed")]);
static FORCE_ENG_SPEED: CommandSpec = spec("FORCE_ENG_SPEED", &[speed("Speed")]);
static SPEED_AXIS_MOVE: CommandSpec = spec("SPEED_AXIS_MOVE", &[speed("Speed")]);

static SPEED: &[(u8, Node)] = &[
    (0x02, Node::Spec(&SPEED_LASER_1)),
    (0x03, Node::Spec(&SPEED_AXIS)),
    (0x04, Node::Spec(&SPEED_LASER_1_PART)),
    (0x05, Node::Spec(&FORCE_ENG_SPEED)),
    (0x06, Node::Spec(&SPEED_AXIS_MOVE)),
];

// Layer group (0xCA)

static CA_01: CommandSpec = spec("CA_01", &[uint7("Flags")]);
static CA_02: CommandSpec = spec("CA_02", &[uint7("Part")]);
static CA_03: CommandSpec = spec("CA_03", &[uint7("Value")]);
static CA_10: CommandSpec = spec("CA_10", &[uint7("Value")]);
static BLOW_ON_OFF: CommandSpec = spec("BLOW_ON_OFF", &[on_off("Blower")]);
static LAYER_COUNT: CommandSpec = spec("LAYER_COUNT", &[uint7("Count")]);

static LAYER: &[(u8, Node)] = &[
    (0x01, Node::Spec(&CA_01)),
    (0x02, Node::Spec(&CA_02)),
    (0x03, Node::Spec(&CA_03)),
    (0x10, Node::Spec(&CA_10)),
    (0x12, Node::Spec(&BLOW_ON_OFF)),
    (0x22, Node::Spec(&LAYER_COUNT)),
];

// Process control (0xD8)

static PROCESS: &[(u8, Node)] = &[
    (0x00, Node::Label("START_PROCESS")),
    (0x01, Node::Label("STOP_PROCESS")),
    (0x02, Node::Label("PAUSE_PROCESS")),
    (0x03, Node::Label("RESTORE_PROCESS")),
    (0x10, Node::Label("REF_POINT_2")),
    (0x11, Node::Label("REF_POINT_1")),
    (0x12, Node::Label("REF_POINT_0")),
    (0x2A, Node::Label("HOME_XY")),
    (0x2C, Node::Label("HOME_Z")),
    (0x2E, Node::Label("FOCUS_Z")),
];

// Rapid moves (0xD9)

static RAPID_MOVE_X: CommandSpec = spec("RAPID_MOVE_X", &[rapid_option(), um35("X")]);
static RAPID_MOVE_Y: CommandSpec = spec("RAPID_MOVE_Y", &[rapid_option(), um35("Y")]);
static RAPID_MOVE_Z: CommandSpec = spec("RAPID_MOVE_Z", &[rapid_option(), um35("Z")]);
static RAPID_MOVE_U: CommandSpec = spec("RAPID_MOVE_U", &[rapid_option(), um35("U")]);
static RAPID_MOVE_XY: CommandSpec =
    spec("RAPID_MOVE_XY", &[rapid_option(), um35("X"), um35("Y")]);
static RAPID_MOVE_XYU: CommandSpec = spec(
    "RAPID_MOVE_XYU",
    &[rapid_option(), um35("X"), um35("Y"), um35("U")],
);

static RAPID: &[(u8, Node)] = &[
    (0x00, Node::Spec(&RAPID_MOVE_X)),
    (0x01, Node::Spec(&RAPID_MOVE_Y)),
    (0x02, Node::Spec(&RAPID_MOVE_Z)),
    (0x03, Node::Spec(&RAPID_MOVE_U)),
    (0x10, Node::Spec(&RAPID_MOVE_XY)),
    (0x30, Node::Spec(&RAPID_MOVE_XYU)),
];

// Controller memory access (0xDA).
//
// GET_SETTING's address parameter is typed MtAddr: decoding it arms the
// memory-reply chain, and the reply shape comes from the memory table.
// SET_SETTING renders its address the same way but must not arm the chain,
// so it uses a plain Uint14 representation.

static GET_SETTING: CommandSpec = spec(
    "GET_SETTING",
    &[prim("Addr", DecoderKind::MtAddr, PrimType::MtAddr)],
);
static SET_SETTING: CommandSpec = spec(
    "SET_SETTING",
    &[
        prim("Addr", DecoderKind::MtAddr, PrimType::Uint14),
        uint35("Value"),
    ],
);

static MEMORY: &[(u8, Node)] = &[
    (0x00, Node::Spec(&GET_SETTING)),
    (0x01, Node::Spec(&SET_SETTING)),
];

// Job framing (0xE7)

static SET_FILENAME: CommandSpec = spec("SET_FILENAME", &[cstring("Name")]);
static PROCESS_TOP_LEFT: CommandSpec = spec("PROCESS_TOP_LEFT", &[um35("X"), um35("Y")]);
static E7_04: CommandSpec = spec("E7_04", &[tbd("Data")]);
static E7_05: CommandSpec = spec("E7_05", &[tbd("Data")]);
static PROCESS_BOTTOM_RIGHT: CommandSpec =
    spec("PROCESS_BOTTOM_RIGHT", &[um35("X"), um35("Y")]);
static ARRAY_MIN_POINT: CommandSpec = spec("ARRAY_MIN_POINT", &[um35("X"), um35("Y")]);
static ARRAY_MAX_POINT: CommandSpec = spec("ARRAY_MAX_POINT", &[um35("X"), um35("Y")]);
static E7_23: CommandSpec = spec("E7_23", &[um35("X"), um35("Y")]);
static E7_24: CommandSpec = spec("E7_24", &[tbd("Data")]);
static E7_35: CommandSpec = spec("E7_35", &[uint14("Index"), tbd("Data")]);
static E7_37: CommandSpec = spec("E7_37", &[tbd("Data")]);
static E7_38: CommandSpec = spec("E7_38", &[tbd("Data")]);
static DOCUMENT_MIN_POINT: CommandSpec = spec("DOCUMENT_MIN_POINT", &[um35("X"), um35("Y")]);
static DOCUMENT_MAX_POINT: CommandSpec = spec("DOCUMENT_MAX_POINT", &[um35("X"), um35("Y")]);
static PART_MIN_POINT: CommandSpec =
    spec("PART_MIN_POINT", &[uint7("Part"), um35("X"), um35("Y")]);
static PART_MAX_POINT: CommandSpec =
    spec("PART_MAX_POINT", &[uint7("Part"), um35("X"), um35("Y")]);
static E7_54: CommandSpec = spec("E7_54", &[tbd("Data")]);
static E7_55: CommandSpec = spec("E7_55", &[tbd("Data")]);
static E7_60: CommandSpec = spec("E7_60", &[tbd("Data")]);

static JOB: &[(u8, Node)] = &[
    (0x00, Node::Label("BLOCK_END")),
    (0x01, Node::Spec(&SET_FILENAME)),
    (0x03, Node::Spec(&PROCESS_TOP_LEFT)),
    (0x04, Node::Spec(&E7_04)),
    (0x05, Node::Spec(&E7_05)),
    (0x07, Node::Spec(&PROCESS_BOTTOM_RIGHT)),
    (0x13, Node::Spec(&ARRAY_MIN_POINT)),
    (0x17, Node::Spec(&ARRAY_MAX_POINT)),
    (0x23, Node::Spec(&E7_23)),
    (0x24, Node::Spec(&E7_24)),
    (0x35, Node::Spec(&E7_35)),
    (0x37, Node::Spec(&E7_37)),
    (0x38, Node::Spec(&E7_38)),
    (0x50, Node::Spec(&DOCUMENT_MIN_POINT)),
    (0x51, Node::Spec(&DOCUMENT_MAX_POINT)),
    (0x52, Node::Spec(&PART_MIN_POINT)),
    (0x53, Node::Spec(&PART_MAX_POINT)),
    (0x54, Node::Spec(&E7_54)),
    (0x55, Node::Spec(&E7_55)),
    (0x60, Node::Spec(&E7_60)),
];

// File operations (0xE8). E8 01 is a query: the controller answers with an
// undecoded payload, captured whole.

static E8_00: CommandSpec = spec("E8_00", &[tbd("Data")]);
static E8_01: CommandSpec = spec(
    "E8_01",
    &[
        uint14("Number"),
        Param::Reply,
        prim("Reply", DecoderKind::Tbd, PrimType::Tbd),
    ],
);
static E8_02: CommandSpec = spec("E8_02", &[tbd("Data")]);
static E8_03: CommandSpec = spec("E8_03", &[tbd("Data")]);

static FILE_OPS: &[(u8, Node)] = &[
    (0x00, Node::Spec(&E8_00)),
    (0x01, Node::Spec(&E8_01)),
    (0x02, Node::Spec(&E8_02)),
    (0x03, Node::Spec(&E8_03)),
];

static EA: CommandSpec = spec("EA", &[uint7("Index")]);

// Run control (0xF1) and document table (0xF2)

static START_0: CommandSpec = spec("START_0", &[uint7("Index")]);
static START_1: CommandSpec = spec("START_1", &[uint7("Index")]);
static START_2: CommandSpec = spec("START_2", &[uint7("Index")]);
static LASER_2_OFFSET: CommandSpec = spec("LASER_2_OFFSET", &[um35("X"), um35("Y")]);
static F1_04: CommandSpec = spec("F1_04", &[uint7("Value")]);

static RUN: &[(u8, Node)] = &[
    (0x00, Node::Spec(&START_0)),
    (0x01, Node::Spec(&START_1)),
    (0x02, Node::Spec(&START_2)),
    (0x03, Node::Spec(&LASER_2_OFFSET)),
    (0x04, Node::Spec(&F1_04)),
];

static F2_00: CommandSpec = spec("F2_00", &[uint7("Index")]);
static F2_01: CommandSpec = spec("F2_01", &[uint7("Index")]);
static F2_02: CommandSpec = spec("F2_02", &[tbd("Data")]);
static F2_03: CommandSpec = spec("F2_03", &[um35("X"), um35("Y")]);
static F2_04: CommandSpec = spec("F2_04", &[um35("X"), um35("Y")]);
static F2_05: CommandSpec = spec("F2_05", &[tbd("Data")]);
static F2_06: CommandSpec = spec("F2_06", &[tbd("Data")]);
static F2_07: CommandSpec = spec("F2_07", &[tbd("Data")]);

static DOCUMENT: &[(u8, Node)] = &[
    (0x00, Node::Spec(&F2_00)),
    (0x01, Node::Spec(&F2_01)),
    (0x02, Node::Spec(&F2_02)),
    (0x03, Node::Spec(&F2_03)),
    (0x04, Node::Spec(&F2_04)),
    (0x05, Node::Spec(&F2_05)),
    (0x06, Node::Spec(&F2_06)),
    (0x07, Node::Spec(&F2_07)),
];

/// Root command table, indexed by the command byte
pub static CT: &[(u8, Node)] = &[
    (0x80, Node::Table(AXIS_MOVE)),
    (0x88, Node::Spec(&MOVE_ABS_XY)),
    (0x89, Node::Spec(&MOVE_REL_XY)),
    (0x8A, Node::Spec(&MOVE_REL_X)),
    (0x8B, Node::Spec(&MOVE_REL_Y)),
    (0xA8, Node::Spec(&CUT_ABS_XY)),
    (0xA9, Node::Spec(&CUT_REL_XY)),
    (0xAA, Node::Spec(&CUT_REL_X)),
    (0xAB, Node::Spec(&CUT_REL_Y)),
    (0xC6, Node::Table(POWER)),
    (0xC7, Node::Spec(&IMD_POWER_1)),
    (0xC8, Node::Spec(&END_POWER_1)),
    (0xC9, Node::Table(SPEED)),
    (0xCA, Node::Table(LAYER)),
    (0xD7, Node::Label("EOF")),
    (0xD8, Node::Table(PROCESS)),
    (0xD9, Node::Table(RAPID)),
    (0xDA, Node::Table(MEMORY)),
    (0xE6, Node::Table(&[(0x01, Node::Label("SET_ABSOLUTE"))])),
    (0xE7, Node::Table(JOB)),
    (0xE8, Node::Table(FILE_OPS)),
    (0xEA, Node::Spec(&EA)),
    (0xEB, Node::Label("FINISH")),
    (0xF1, Node::Table(RUN)),
    (0xF2, Node::Table(DOCUMENT)),
];

/// Reply table for memory reads. The reply echoes the memory command and a
/// sub-opcode, then the two address bytes, then the value.
pub static RT: &[(u8, Node)] = &[(0xDA, Node::Table(RT_MEMORY))];

static MEM_RESULT: CommandSpec = spec("MEM_RESULT", &[]);

static RT_MEMORY: &[(u8, Node)] = &[
    (0x00, Node::Spec(&MEM_RESULT)),
    (0x01, Node::Spec(&MEM_RESULT)),
];

const fn mem(label: &'static str, kind: DecoderKind, ty: PrimType) -> MemoryEntry {
    MemoryEntry {
        label,
        reply: PrimSpec {
            name: "Reply",
            kind,
            ty,
        },
    }
}

const fn mem_um(label: &'static str) -> MemoryEntry {
    mem(label, DecoderKind::Um, PrimType::Int35)
}

const fn mem_speed(label: &'static str) -> MemoryEntry {
    mem(label, DecoderKind::Speed, PrimType::Int35)
}

const fn mem_time(label: &'static str) -> MemoryEntry {
    mem(label, DecoderKind::TimeMs, PrimType::Int35)
}

const fn mem_tbd(label: &'static str) -> MemoryEntry {
    mem(label, DecoderKind::Tbd, PrimType::Tbd)
}

/// Reply shape for addresses the memory table does not know
pub static UNKNOWN_ADDRESS: MemoryEntry = mem_tbd("Unknown Address");

static MT_SYSTEM: &[(u8, MemoryEntry)] = &[
    (0x10, mem_tbd("System Control Mode")),
    (
        0x11,
        mem("Laser PWM Frequency 1", DecoderKind::Frequency, PrimType::Int35),
    ),
    (0x12, mem("Laser Min Power 1", DecoderKind::Power, PrimType::Uint14)),
    (0x13, mem("Laser Max Power 1", DecoderKind::Power, PrimType::Uint14)),
    (0x16, mem_tbd("Laser Attenuation")),
    (
        0x17,
        mem("Laser PWM Frequency 2", DecoderKind::Frequency, PrimType::Int35),
    ),
    (0x18, mem("Laser Min Power 2", DecoderKind::Power, PrimType::Uint14)),
    (0x19, mem("Laser Max Power 2", DecoderKind::Power, PrimType::Uint14)),
    (0x20, mem_tbd("Axis Control Para 1")),
    (0x21, mem_tbd("Axis Precision 1")),
    (0x23, mem_speed("Axis Max Velocity 1")),
    (0x24, mem_speed("Axis Start Velocity 1")),
    (0x25, mem_tbd("Axis Max Acc 1")),
    (0x26, mem_um("Axis Range 1")),
    (0x27, mem_speed("Axis Btn Start Velocity 1")),
    (0x28, mem_tbd("Axis Btn Acc 1")),
    (0x29, mem_tbd("Axis Estop Acc 1")),
    (0x2A, mem_um("Axis Home Offset 1")),
    (0x2B, mem_um("Axis Backlash 1")),
    (0x30, mem_tbd("Axis Control Para 2")),
    (0x31, mem_tbd("Axis Precision 2")),
    (0x33, mem_speed("Axis Max Velocity 2")),
    (0x34, mem_speed("Axis Start Velocity 2")),
    (0x35, mem_tbd("Axis Max Acc 2")),
    (0x36, mem_um("Axis Range 2")),
    (0x37, mem_speed("Axis Btn Start Velocity 2")),
    (0x38, mem_tbd("Axis Btn Acc 2")),
    (0x39, mem_tbd("Axis Estop Acc 2")),
    (0x3A, mem_um("Axis Home Offset 2")),
    (0x3B, mem_um("Axis Backlash 2")),
    (0x46, mem_um("Axis Range 3")),
    (0x4A, mem_um("Axis Home Offset 3")),
    (0x56, mem_um("Axis Range 4")),
    (0x5A, mem_um("Axis Home Offset 4")),
];

static MT_RUNTIME: &[(u8, MemoryEntry)] = &[
    (0x11, mem_time("Total Open Time")),
    (0x12, mem_time("Total Work Time")),
    (0x13, mem("Total Work Number", DecoderKind::Uint, PrimType::Uint35)),
    (0x21, mem_um("Axis Position 1")),
    (0x31, mem_um("Axis Position 2")),
];

static MT_STATUS: &[(u8, MemoryEntry)] = &[(
    0x05,
    mem("Machine Status", DecoderKind::Uint, PrimType::Uint35),
)];

static MT_CARD: &[(u8, MemoryEntry)] = &[
    (0x7E, mem("Mainboard Version", DecoderKind::CString, PrimType::CString)),
    (0x7F, mem("Card ID", DecoderKind::CString, PrimType::CString)),
];

/// Memory table: controller address to label and reply shape.
///
/// Outer key is the address MSB, inner the LSB; both are 7-bit.
pub static MT: &[(u8, &[(u8, MemoryEntry)])] = &[
    (0x00, MT_SYSTEM),
    (0x02, MT_RUNTIME),
    (0x04, MT_STATUS),
    (0x05, MT_CARD),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CMD_MASK;

    fn assert_sorted(keys: &[u8], what: &str) {
        for pair in keys.windows(2) {
            assert!(
                pair[0] < pair[1],
                "{what}: keys {:#04X} and {:#04X} out of order",
                pair[0],
                pair[1]
            );
        }
    }

    fn check_spec(spec: &CommandSpec, context: &str) {
        assert!(
            !spec.params.is_empty(),
            "{context}: {} has an empty parameter list",
            spec.label
        );
        let last = spec.params.len() - 1;
        for (index, param) in spec.params.iter().enumerate() {
            match param {
                Param::Reply => {
                    assert!(
                        index < last,
                        "{context}: {} has a reply marker in terminal position",
                        spec.label
                    );
                }
                Param::Prim(prim) => {
                    // Packet-remainder and memory-trigger captures only make
                    // sense as the final position.
                    if prim.ty == PrimType::Tbd
                        || prim.ty == PrimType::CString
                        || prim.ty == PrimType::MtAddr
                    {
                        assert!(
                            index == last,
                            "{context}: {} has a variable/trigger parameter before the end",
                            spec.label
                        );
                    }
                }
            }
        }
    }

    fn check_table(table: &'static [(u8, Node)], depth: usize, root: bool, what: &str) {
        assert!(depth <= 2, "{what}: table nested deeper than two levels");
        assert_sorted(&table.iter().map(|(k, _)| *k).collect::<Vec<_>>(), what);
        for (key, node) in table {
            if root {
                assert!(
                    key & CMD_MASK != 0,
                    "{what}: root opcode {key:#04X} lacks the command bit"
                );
            } else {
                assert!(
                    key & CMD_MASK == 0,
                    "{what}: sub-opcode {key:#04X} has the command bit set"
                );
            }
            match node {
                Node::Label(label) => assert!(!label.is_empty()),
                Node::Spec(spec) => check_spec(spec, what),
                Node::Table(sub) => {
                    assert!(root, "{what}: sub-table below {key:#04X} exceeds depth 2");
                    check_table(sub, depth + 1, false, what);
                }
            }
        }
    }

    #[test]
    fn command_table_is_well_formed() {
        check_table(CT, 1, true, "CT");
    }

    #[test]
    fn reply_table_is_well_formed() {
        assert_sorted(&RT.iter().map(|(k, _)| *k).collect::<Vec<_>>(), "RT");
        for (key, node) in RT {
            assert!(key & CMD_MASK != 0);
            let Node::Table(sub) = node else {
                panic!("RT root {key:#04X} must dispatch a sub-command table");
            };
            assert_sorted(&sub.iter().map(|(k, _)| *k).collect::<Vec<_>>(), "RT sub");
            for (sub_key, sub_node) in *sub {
                assert!(sub_key & CMD_MASK == 0);
                assert!(
                    matches!(sub_node, Node::Spec(_)),
                    "RT entry {key:#04X} {sub_key:#04X} must be a spec"
                );
            }
        }
    }

    #[test]
    fn memory_table_is_well_formed() {
        assert_sorted(&MT.iter().map(|(k, _)| *k).collect::<Vec<_>>(), "MT");
        for (msb, inner) in MT {
            assert!(msb & CMD_MASK == 0, "MT MSB {msb:#04X} is not 7-bit");
            assert_sorted(&inner.iter().map(|(k, _)| *k).collect::<Vec<_>>(), "MT inner");
            for (lsb, entry) in *inner {
                assert!(lsb & CMD_MASK == 0, "MT LSB {lsb:#04X} is not 7-bit");
                assert!(!entry.label.is_empty());
            }
        }
    }

    #[test]
    fn memory_trigger_only_arms_the_read_command() {
        // Only GET_SETTING may carry the MtAddr trigger type; a trigger on
        // any other command would send the parser into the reply chain with
        // no reply coming.
        fn spec_has_trigger(spec: &CommandSpec) -> bool {
            spec.params.iter().any(|param| {
                matches!(
                    param,
                    Param::Prim(PrimSpec {
                        ty: PrimType::MtAddr,
                        ..
                    })
                )
            })
        }
        for (key, node) in CT {
            match node {
                Node::Spec(spec) => assert!(!spec_has_trigger(spec)),
                Node::Table(sub) => {
                    for (sub_key, sub_node) in *sub {
                        if let Node::Spec(spec) = sub_node {
                            if spec_has_trigger(spec) {
                                assert_eq!((*key, *sub_key), (0xDA, 0x00));
                            }
                        }
                    }
                }
                Node::Label(_) => {}
            }
        }
    }
}
