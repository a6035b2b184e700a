//! On-demand polyfill helpers.
//!
//! Direct3D disagrees with the source language on a handful of operations:
//! integer division traps on zero and `INT_MIN / -1`, `abs`/negation overflow
//! on `INT_MIN`, `modf`/`frexp` use out-parameters, shader model 5 lacks the
//! bit-field intrinsics, and float-to-int casts are undefined on NaN. Each
//! gets a small `_glaive_*` function, emitted only when the module needs it.
//! Vector shapes delegate to the scalar form, one component at a time.

use super::{Error, Writer};
use crate::proc::NameKey;
use std::fmt::Write;

bitflags::bitflags! {
    pub(super) struct HelperFlags: u32 {
        const INT_DIV = 1;
        const INT_MOD = 1 << 1;
        const ABS_INT = 1 << 2;
        const NEG_INT = 1 << 3;
        const MODF = 1 << 4;
        const FREXP = 1 << 5;
        const EXTRACT_BITS = 1 << 6;
        const INSERT_BITS = 1 << 7;
        const F2I32 = 1 << 8;
        const F2U32 = 1 << 9;
    }
}

/// Componentwise vector overloads delegating to the scalar form, which must
/// already be in scope.
fn write_vector_overloads(
    out: &mut String,
    name: &str,
    ret_prefix: &str,
    arg_prefix: &str,
    two_args: bool,
) -> Result<(), std::fmt::Error> {
    for size in 2..=4usize {
        let components = &["x", "y", "z", "w"][..size];
        let calls: Vec<String> = components
            .iter()
            .map(|c| {
                if two_args {
                    format!("{}(a.{}, b.{})", name, c, c)
                } else {
                    format!("{}(v.{})", name, c)
                }
            })
            .collect();
        if two_args {
            writeln!(
                out,
                "{ret}{size} {name}({arg}{size} a, {arg}{size} b) {{ return {ret}{size}({calls}); }}",
                ret = ret_prefix,
                size = size,
                name = name,
                arg = arg_prefix,
                calls = calls.join(", "),
            )?;
        } else {
            writeln!(
                out,
                "{ret}{size} {name}({arg}{size} v) {{ return {ret}{size}({calls}); }}",
                ret = ret_prefix,
                size = size,
                name = name,
                arg = arg_prefix,
                calls = calls.join(", "),
            )?;
        }
    }
    Ok(())
}

impl<'a> Writer<'a> {
    /// Write all requested helpers, returning their names for the reflection
    /// info.
    pub(super) fn write_helpers(&mut self) -> Result<Vec<String>, Error> {
        let mut emitted = Vec::new();

        if self.helpers.contains(HelperFlags::INT_DIV) {
            writeln!(
                self.out,
                "int _glaive_div(int a, int b) {{ return a / (((b == 0) || ((a == (-2147483647 - 1)) && (b == -1))) ? 1 : b); }}"
            )?;
            writeln!(
                self.out,
                "uint _glaive_div(uint a, uint b) {{ return a / ((b == 0u) ? 1u : b); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_div", "int", "int", true)?;
            write_vector_overloads(&mut self.out, "_glaive_div", "uint", "uint", true)?;
            emitted.push(String::from("_glaive_div"));
        }
        if self.helpers.contains(HelperFlags::INT_MOD) {
            writeln!(
                self.out,
                "int _glaive_mod(int a, int b) {{ return a % (((b == 0) || ((a == (-2147483647 - 1)) && (b == -1))) ? 1 : b); }}"
            )?;
            writeln!(
                self.out,
                "uint _glaive_mod(uint a, uint b) {{ return a % ((b == 0u) ? 1u : b); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_mod", "int", "int", true)?;
            write_vector_overloads(&mut self.out, "_glaive_mod", "uint", "uint", true)?;
            emitted.push(String::from("_glaive_mod"));
        }
        if self.helpers.contains(HelperFlags::ABS_INT) {
            writeln!(
                self.out,
                "int _glaive_abs(int a) {{ return (a == (-2147483647 - 1)) ? a : abs(a); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_abs", "int", "int", false)?;
            emitted.push(String::from("_glaive_abs"));
        }
        if self.helpers.contains(HelperFlags::NEG_INT) {
            writeln!(
                self.out,
                "int _glaive_neg(int a) {{ return (a == (-2147483647 - 1)) ? a : -a; }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_neg", "int", "int", false)?;
            emitted.push(String::from("_glaive_neg"));
        }
        if self.helpers.contains(HelperFlags::EXTRACT_BITS) {
            // offset and count are pre-clamped, matching the defined behavior
            // of the source language
            writeln!(
                self.out,
                "uint _glaive_extract_bits(uint e, uint offset, uint count) {{"
            )?;
            writeln!(self.out, "    uint w = 32u;")?;
            writeln!(self.out, "    uint o = min(offset, w);")?;
            writeln!(self.out, "    uint c = min(count, w - o);")?;
            writeln!(
                self.out,
                "    return (c == 0u) ? 0u : ((e << (w - c - o)) >> (w - c));"
            )?;
            writeln!(self.out, "}}")?;
            writeln!(
                self.out,
                "int _glaive_extract_bits(int e, uint offset, uint count) {{"
            )?;
            writeln!(self.out, "    uint w = 32u;")?;
            writeln!(self.out, "    uint o = min(offset, w);")?;
            writeln!(self.out, "    uint c = min(count, w - o);")?;
            writeln!(
                self.out,
                "    return (c == 0u) ? 0 : ((e << (w - c - o)) >> (w - c));"
            )?;
            writeln!(self.out, "}}")?;
            emitted.push(String::from("_glaive_extract_bits"));
        }
        if self.helpers.contains(HelperFlags::INSERT_BITS) {
            writeln!(
                self.out,
                "uint _glaive_insert_bits(uint e, uint newbits, uint offset, uint count) {{"
            )?;
            writeln!(self.out, "    uint w = 32u;")?;
            writeln!(self.out, "    uint o = min(offset, w);")?;
            writeln!(self.out, "    uint c = min(count, w - o);")?;
            writeln!(
                self.out,
                "    uint mask = ((c == 32u) ? 0xffffffffu : ((1u << c) - 1u)) << o;"
            )?;
            writeln!(
                self.out,
                "    return ((newbits << o) & mask) | (e & ~mask);"
            )?;
            writeln!(self.out, "}}")?;
            emitted.push(String::from("_glaive_insert_bits"));
        }
        if self.helpers.contains(HelperFlags::F2I32) {
            // NaN lands on zero, everything else saturates
            writeln!(
                self.out,
                "int _glaive_f2i32(float v) {{ return int(clamp((v == v) ? v : 0.0, -2147483600.0, 2147483500.0)); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_f2i32", "int", "float", false)?;
            emitted.push(String::from("_glaive_f2i32"));
        }
        if self.helpers.contains(HelperFlags::F2U32) {
            writeln!(
                self.out,
                "uint _glaive_f2u32(float v) {{ return uint(clamp((v == v) ? v : 0.0, 0.0, 4294967000.0)); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_f2u32", "uint", "float", false)?;
            emitted.push(String::from("_glaive_f2u32"));
        }
        if self.helpers.contains(HelperFlags::MODF) {
            if let Some(ty) = self.find_decompose_result_type(crate::MathFunction::Modf) {
                let struct_name = self.names[&NameKey::Type(ty)].clone();
                let field0 = self.names[&NameKey::StructMember(ty, 0)].clone();
                let field1 = self.names[&NameKey::StructMember(ty, 1)].clone();
                writeln!(
                    self.out,
                    "{strct} _glaive_modf(float x) {{ {strct} s; s.{f0} = modf(x, s.{f1}); return s; }}",
                    strct = struct_name,
                    f0 = field0,
                    f1 = field1,
                )?;
                emitted.push(String::from("_glaive_modf"));
            }
        }
        if self.helpers.contains(HelperFlags::FREXP) {
            if let Some(ty) = self.find_decompose_result_type(crate::MathFunction::Frexp) {
                let struct_name = self.names[&NameKey::Type(ty)].clone();
                let field0 = self.names[&NameKey::StructMember(ty, 0)].clone();
                let field1 = self.names[&NameKey::StructMember(ty, 1)].clone();
                // HLSL frexp hands back a float exponent
                writeln!(
                    self.out,
                    "{strct} _glaive_frexp(float x) {{ {strct} s; float e; s.{f0} = frexp(x, e); s.{f1} = int(e); return s; }}",
                    strct = struct_name,
                    f0 = field0,
                    f1 = field1,
                )?;
                emitted.push(String::from("_glaive_frexp"));
            }
        }
        if !emitted.is_empty() {
            writeln!(self.out)?;
        }
        Ok(emitted)
    }

    pub(super) fn find_decompose_result_type(
        &self,
        target: crate::MathFunction,
    ) -> Option<crate::Handle<crate::Type>> {
        for (_, fun) in self.module.functions.iter() {
            for (handle, expression) in fun.expressions.iter() {
                if let crate::Expression::Math { fun: mf, .. } = *expression {
                    if mf == target {
                        if let Some(resolution) = fun.expression_types.get(handle.index()) {
                            return resolution.handle();
                        }
                    }
                }
            }
        }
        None
    }
}
