//! Opcode byte assignments. Shared by the assembler, the VM and the
//! disassembler; changing a value here changes the codefile format.

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0x00,

    // Moves and loads
    Mov = 0x01,
    Ldi4 = 0x02,
    Ldi8 = 0x03,
    Ldi16 = 0x04,
    Ldi32 = 0x05,
    Ldi64 = 0x06,
    Ldf = 0x07,
    Ldstr = 0x08,

    // Three-register arithmetic
    Add = 0x10,
    UAdd = 0x11,
    FAdd = 0x12,
    Sub = 0x13,
    USub = 0x14,
    FSub = 0x15,
    Mul = 0x16,
    UMul = 0x17,
    FMul = 0x18,
    Div = 0x19,
    UDiv = 0x1A,
    FDiv = 0x1B,

    // Immediate arithmetic
    Add8 = 0x1C,
    Add16 = 0x1D,
    Sub8 = 0x1E,
    Sub16 = 0x1F,
    Mul8 = 0x20,
    Mul16 = 0x21,
    Inc = 0x22,
    Dec = 0x23,
    Neg = 0x24,
    FNeg = 0x25,

    // Comparison
    Cmp = 0x30,
    ICmp = 0x31,
    FCmp = 0x32,
    TestZ = 0x33,

    // Jumps: even = 8-bit offset, odd = 16-bit offset
    Jmp8 = 0x40,
    Jmp16 = 0x41,
    Je8 = 0x42,
    Je16 = 0x43,
    Jne8 = 0x44,
    Jne16 = 0x45,
    Jl8 = 0x46,
    Jl16 = 0x47,
    Jge8 = 0x48,
    Jge16 = 0x49,
    Jg8 = 0x4A,
    Jg16 = 0x4B,
    Jle8 = 0x4C,
    Jle16 = 0x4D,

    // Stack, locals, globals
    Push = 0x50,
    Pop = 0x51,
    LocalGet = 0x52,
    LocalSet = 0x53,
    GlobalGet = 0x54,
    GlobalSet = 0x55,

    // Calls and returns
    Call = 0x60,
    Call8 = 0x61,
    Ret = 0x62,
    RetVoid = 0x63,
    RetLocal = 0x64,
    RetGlobal = 0x65,

    // Arrays
    ArrayNew = 0x70,
    ArrayGet = 0x71,
    ArraySet = 0x72,
    ArrayDestroy = 0x73,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0x00 => Nop,
            0x01 => Mov,
            0x02 => Ldi4,
            0x03 => Ldi8,
            0x04 => Ldi16,
            0x05 => Ldi32,
            0x06 => Ldi64,
            0x07 => Ldf,
            0x08 => Ldstr,
            0x10 => Add,
            0x11 => UAdd,
            0x12 => FAdd,
            0x13 => Sub,
            0x14 => USub,
            0x15 => FSub,
            0x16 => Mul,
            0x17 => UMul,
            0x18 => FMul,
            0x19 => Div,
            0x1A => UDiv,
            0x1B => FDiv,
            0x1C => Add8,
            0x1D => Add16,
            0x1E => Sub8,
            0x1F => Sub16,
            0x20 => Mul8,
            0x21 => Mul16,
            0x22 => Inc,
            0x23 => Dec,
            0x24 => Neg,
            0x25 => FNeg,
            0x30 => Cmp,
            0x31 => ICmp,
            0x32 => FCmp,
            0x33 => TestZ,
            0x40 => Jmp8,
            0x41 => Jmp16,
            0x42 => Je8,
            0x43 => Je16,
            0x44 => Jne8,
            0x45 => Jne16,
            0x46 => Jl8,
            0x47 => Jl16,
            0x48 => Jge8,
            0x49 => Jge16,
            0x4A => Jg8,
            0x4B => Jg16,
            0x4C => Jle8,
            0x4D => Jle16,
            0x50 => Push,
            0x51 => Pop,
            0x52 => LocalGet,
            0x53 => LocalSet,
            0x54 => GlobalGet,
            0x55 => GlobalSet,
            0x60 => Call,
            0x61 => Call8,
            0x62 => Ret,
            0x63 => RetVoid,
            0x64 => RetLocal,
            0x65 => RetGlobal,
            0x70 => ArrayNew,
            0x71 => ArrayGet,
            0x72 => ArraySet,
            0x73 => ArrayDestroy,
            _ => return None,
        })
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Mov => "mov",
            Ldi4 => "ldi4",
            Ldi8 => "ldi8",
            Ldi16 => "ldi16",
            Ldi32 => "ldi32",
            Ldi64 => "ldi64",
            Ldf => "ldf",
            Ldstr => "ldstr",
            Add => "add",
            UAdd => "uadd",
            FAdd => "fadd",
            Sub => "sub",
            USub => "usub",
            FSub => "fsub",
            Mul => "mul",
            UMul => "umul",
            FMul => "fmul",
            Div => "div",
            UDiv => "udiv",
            FDiv => "fdiv",
            Add8 => "add8",
            Add16 => "add16",
            Sub8 => "sub8",
            Sub16 => "sub16",
            Mul8 => "mul8",
            Mul16 => "mul16",
            Inc => "inc",
            Dec => "dec",
            Neg => "neg",
            FNeg => "fneg",
            Cmp => "cmp",
            ICmp => "icmp",
            FCmp => "fcmp",
            TestZ => "testz",
            Jmp8 => "jmp8",
            Jmp16 => "jmp16",
            Je8 => "je8",
            Je16 => "je16",
            Jne8 => "jne8",
            Jne16 => "jne16",
            Jl8 => "jl8",
            Jl16 => "jl16",
            Jge8 => "jge8",
            Jge16 => "jge16",
            Jg8 => "jg8",
            Jg16 => "jg16",
            Jle8 => "jle8",
            Jle16 => "jle16",
            Push => "push",
            Pop => "pop",
            LocalGet => "localget",
            LocalSet => "localset",
            GlobalGet => "globalget",
            GlobalSet => "globalset",
            Call => "call",
            Call8 => "call8",
            Ret => "ret",
            RetVoid => "retvoid",
            RetLocal => "retlocal",
            RetGlobal => "retglobal",
            ArrayNew => "arraynew",
            ArrayGet => "arrayget",
            ArraySet => "arrayset",
            ArrayDestroy => "arraydestroy",
        }
    }
}
