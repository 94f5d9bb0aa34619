//! Target description documents served through `qXfer:features:read`.
//!
//! GDB matches these registers up by regnum: the m-profile feature covers
//! r0-r12/sp/lr/pc plus xpsr at 25, the m-system feature adds the banked
//! stack pointers, and the VFP feature appears only when the crash dump
//! captured floating point state.

pub const TARGET_XML: &str = "<?xml version=\"1.0\"?>\n\
<!DOCTYPE feature SYSTEM \"gdb-target.dtd\">\n\
<target>\n\
<feature name=\"org.gnu.gdb.arm.m-profile\">\n\
<reg name=\"r0\" bitsize=\"32\"/>\n\
<reg name=\"r1\" bitsize=\"32\"/>\n\
<reg name=\"r2\" bitsize=\"32\"/>\n\
<reg name=\"r3\" bitsize=\"32\"/>\n\
<reg name=\"r4\" bitsize=\"32\"/>\n\
<reg name=\"r5\" bitsize=\"32\"/>\n\
<reg name=\"r6\" bitsize=\"32\"/>\n\
<reg name=\"r7\" bitsize=\"32\"/>\n\
<reg name=\"r8\" bitsize=\"32\"/>\n\
<reg name=\"r9\" bitsize=\"32\"/>\n\
<reg name=\"r10\" bitsize=\"32\"/>\n\
<reg name=\"r11\" bitsize=\"32\"/>\n\
<reg name=\"r12\" bitsize=\"32\"/>\n\
<reg name=\"sp\" bitsize=\"32\" type=\"data_ptr\"/>\n\
<reg name=\"lr\" bitsize=\"32\"/>\n\
<reg name=\"pc\" bitsize=\"32\" type=\"code_ptr\"/>\n\
<reg name=\"xpsr\" bitsize=\"32\" regnum=\"25\"/>\n\
</feature>\n\
<feature name=\"org.gnu.gdb.arm.m-system\">\n\
<reg name=\"msp\" bitsize=\"32\" regnum=\"26\"/>\n\
<reg name=\"psp\" bitsize=\"32\" regnum=\"27\"/>\n\
</feature>\n\
</target>\n";

pub const TARGET_FPU_XML: &str = "<?xml version=\"1.0\"?>\n\
<!DOCTYPE feature SYSTEM \"gdb-target.dtd\">\n\
<target>\n\
<feature name=\"org.gnu.gdb.arm.m-profile\">\n\
<reg name=\"r0\" bitsize=\"32\"/>\n\
<reg name=\"r1\" bitsize=\"32\"/>\n\
<reg name=\"r2\" bitsize=\"32\"/>\n\
<reg name=\"r3\" bitsize=\"32\"/>\n\
<reg name=\"r4\" bitsize=\"32\"/>\n\
<reg name=\"r5\" bitsize=\"32\"/>\n\
<reg name=\"r6\" bitsize=\"32\"/>\n\
<reg name=\"r7\" bitsize=\"32\"/>\n\
<reg name=\"r8\" bitsize=\"32\"/>\n\
<reg name=\"r9\" bitsize=\"32\"/>\n\
<reg name=\"r10\" bitsize=\"32\"/>\n\
<reg name=\"r11\" bitsize=\"32\"/>\n\
<reg name=\"r12\" bitsize=\"32\"/>\n\
<reg name=\"sp\" bitsize=\"32\" type=\"data_ptr\"/>\n\
<reg name=\"lr\" bitsize=\"32\"/>\n\
<reg name=\"pc\" bitsize=\"32\" type=\"code_ptr\"/>\n\
<reg name=\"xpsr\" bitsize=\"32\" regnum=\"25\"/>\n\
</feature>\n\
<feature name=\"org.gnu.gdb.arm.m-system\">\n\
<reg name=\"msp\" bitsize=\"32\" regnum=\"26\"/>\n\
<reg name=\"psp\" bitsize=\"32\" regnum=\"27\"/>\n\
</feature>\n\
<feature name=\"org.gnu.gdb.arm.vfp\">\n\
<reg name=\"d0\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d1\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d2\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d3\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d4\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d5\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d6\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d7\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d8\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d9\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d10\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d11\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d12\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d13\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d14\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"d15\" bitsize=\"64\" type=\"ieee_double\"/>\n\
<reg name=\"fpscr\" bitsize=\"32\" type=\"int\" group=\"float\"/>\n\
</feature>\n\
</target>\n";
