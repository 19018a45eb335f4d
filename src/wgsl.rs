//! Small WGSL assembly layer
//!
//! Kernels are assembled as expression/statement trees and rendered to WGSL
//! text once, instead of being concatenated from format strings. The tree
//! keeps generation-time constants (component widths, tile sizes, unroll
//! factors) out of the text until render time, so the generators stay
//! readable and the emitted source stays deterministic for cache keys.
//!
//! This is not a general shading language model. It covers exactly what the
//! matmul kernels need: scalar/vector/matrix types, u32 and float literals,
//! binary arithmetic with explicit parenthesization for the operator classes
//! WGSL refuses to mix, indexing, member access, calls, `let`/`var`,
//! counted `for` loops, `if`, workgroup barriers, and helper functions.

use std::fmt::{self, Write as _};

use crate::dtype::DType;

const INDENT: &str = "  ";

/// WGSL type spellings used by the kernels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Bool,
    U32,
    I32,
    Scalar(DType),
    /// `vecN<elem>`
    Vec(u32, DType),
    /// `vecN<u32>`
    VecU32(u32),
    /// `array<elem, n>`
    Array(Box<Ty>, u32),
    /// `array<elem>` (runtime-sized, storage bindings only)
    RuntimeArray(Box<Ty>),
    /// A struct or aggregate spelled out elsewhere
    Named(String),
}

impl Ty {
    pub fn array(elem: Ty, n: u32) -> Self {
        Self::Array(Box::new(elem), n)
    }

    pub fn runtime_array(elem: Ty) -> Self {
        Self::RuntimeArray(Box::new(elem))
    }

    /// Scalar or vector of `dtype` with the given packing width.
    pub fn packed(components: u32, dtype: DType) -> Self {
        match components {
            1 => Self::Scalar(dtype),
            n => Self::Vec(n, dtype),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::U32 => f.write_str("u32"),
            Self::I32 => f.write_str("i32"),
            Self::Scalar(dt) => f.write_str(dt.wgsl()),
            Self::Vec(n, dt) => write!(f, "vec{}<{}>", n, dt.wgsl()),
            Self::VecU32(n) => write!(f, "vec{}<u32>", n),
            Self::Array(elem, n) => write!(f, "array<{}, {}>", elem, n),
            Self::RuntimeArray(elem) => write!(f, "array<{}>", elem),
            Self::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Precedence among the plain arithmetic operators. Everything else
    /// (shifts, bitwise, comparisons) gets explicit parentheses because WGSL
    /// rejects mixing those classes without them.
    const fn arith_precedence(self) -> Option<u8> {
        match self {
            Self::Mul | Self::Div | Self::Rem => Some(2),
            Self::Add | Self::Sub => Some(1),
            _ => None,
        }
    }
}

/// A WGSL expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    LitU32(u32),
    /// `u32` literal rendered in hex (masks)
    LitHex(u32),
    LitI32(i32),
    LitFloat(f64),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Call(String, Vec<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    pub fn u32(v: u32) -> Self {
        Self::LitU32(v)
    }

    pub fn hex(v: u32) -> Self {
        Self::LitHex(v)
    }

    pub fn float(v: f64) -> Self {
        Self::LitFloat(v)
    }

    pub fn call(name: impl Into<String>, args: impl Into<Vec<Expr>>) -> Self {
        Self::Call(name.into(), args.into())
    }

    /// Value constructor / conversion: `ty(expr)`
    pub fn cast(ty: &Ty, e: impl Into<Expr>) -> Self {
        Self::Call(ty.to_string(), vec![e.into()])
    }

    pub fn index(self, i: impl Into<Expr>) -> Self {
        Self::Index(Box::new(self), Box::new(i.into()))
    }

    pub fn member(self, field: impl Into<String>) -> Self {
        Self::Member(Box::new(self), field.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Lt, Box::new(self), Box::new(rhs.into()))
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Le, Box::new(self), Box::new(rhs.into()))
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Gt, Box::new(self), Box::new(rhs.into()))
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Ge, Box::new(self), Box::new(rhs.into()))
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Eq, Box::new(self), Box::new(rhs.into()))
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Ne, Box::new(self), Box::new(rhs.into()))
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::And, Box::new(self), Box::new(rhs.into()))
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Or, Box::new(self), Box::new(rhs.into()))
    }

    pub fn shl(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Shl, Box::new(self), Box::new(rhs.into()))
    }

    pub fn shr(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Shr, Box::new(self), Box::new(rhs.into()))
    }

    pub fn bitand(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::BitAnd, Box::new(self), Box::new(rhs.into()))
    }

    pub fn rem(self, rhs: impl Into<Expr>) -> Self {
        Self::Bin(BinOp::Rem, Box::new(self), Box::new(rhs.into()))
    }

    fn write(&self, out: &mut String) {
        match self {
            Self::Ident(name) => out.push_str(name),
            Self::LitU32(v) => {
                let _ = write!(out, "{}u", v);
            }
            Self::LitHex(v) => {
                let _ = write!(out, "0x{:08X}u", v);
            }
            Self::LitI32(v) => {
                let _ = write!(out, "{}", v);
            }
            Self::LitFloat(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    let _ = write!(out, "{:.1}", v);
                } else {
                    let _ = write!(out, "{}", v);
                }
            }
            Self::Bin(op, lhs, rhs) => {
                match op.arith_precedence() {
                    Some(prec) => {
                        lhs.write_child(out, prec, false);
                        let _ = write!(out, " {} ", op.symbol());
                        rhs.write_child(out, prec, true);
                    }
                    None => {
                        // shifts, bitwise and logic always isolate their
                        // operands: WGSL forbids mixing these classes
                        lhs.write_atom(out);
                        let _ = write!(out, " {} ", op.symbol());
                        rhs.write_atom(out);
                    }
                }
            }
            Self::Index(base, i) => {
                base.write_atom(out);
                out.push('[');
                i.write(out);
                out.push(']');
            }
            Self::Member(base, field) => {
                base.write_atom(out);
                out.push('.');
                out.push_str(field);
            }
            Self::Call(name, args) => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.write(out);
                }
                out.push(')');
            }
        }
    }

    fn write_child(&self, out: &mut String, parent_prec: u8, is_rhs: bool) {
        let needs_parens = match self {
            Self::Bin(op, ..) => match op.arith_precedence() {
                Some(prec) => prec < parent_prec || (prec == parent_prec && is_rhs),
                None => true,
            },
            _ => false,
        };
        if needs_parens {
            out.push('(');
            self.write(out);
            out.push(')');
        } else {
            self.write(out);
        }
    }

    fn write_atom(&self, out: &mut String) {
        if matches!(self, Self::Bin(..)) {
            out.push('(');
            self.write(out);
            out.push(')');
        } else {
            self.write(out);
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.write(&mut s);
        f.write_str(&s)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Self::Ident(name.to_string())
    }
}

impl From<u32> for Expr {
    fn from(v: u32) -> Self {
        Self::LitU32(v)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Self::LitFloat(v)
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::Bin($op, Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

impl_expr_op!(Add, add, BinOp::Add);
impl_expr_op!(Sub, sub, BinOp::Sub);
impl_expr_op!(Mul, mul, BinOp::Mul);
impl_expr_op!(Div, div, BinOp::Div);
impl_expr_op!(Rem, rem, BinOp::Rem);

/// A WGSL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(String, Expr),
    /// `var name: ty;` or `var name = init;`
    Var(String, Option<Ty>, Option<Expr>),
    Assign(Expr, Expr),
    AddAssign(Expr, Expr),
    /// `if cond { then } else { otherwise }`; empty else is omitted
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    /// `for (var name = start; name < end; name += step) { body }`
    For {
        var: String,
        start: Expr,
        end: Expr,
        step: u32,
        body: Vec<Stmt>,
    },
    Barrier,
    Return(Option<Expr>),
    /// Expression in statement position (calls with side effects)
    Expr(Expr),
}

impl Stmt {
    pub fn let_(name: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self::Let(name.into(), value.into())
    }

    pub fn var(name: impl Into<String>, ty: Ty) -> Self {
        Self::Var(name.into(), Some(ty), None)
    }

    pub fn var_init(name: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self::Var(name.into(), None, Some(value.into()))
    }

    pub fn assign(target: Expr, value: impl Into<Expr>) -> Self {
        Self::Assign(target, value.into())
    }

    pub fn add_assign(target: Expr, value: impl Into<Expr>) -> Self {
        Self::AddAssign(target, value.into())
    }

    pub fn if_(cond: Expr, then: Vec<Stmt>) -> Self {
        Self::If(cond, then, Vec::new())
    }

    pub fn for_(
        var: impl Into<String>,
        start: impl Into<Expr>,
        end: impl Into<Expr>,
        body: Vec<Stmt>,
    ) -> Self {
        Self::For {
            var: var.into(),
            start: start.into(),
            end: end.into(),
            step: 1,
            body,
        }
    }

    pub fn for_step(
        var: impl Into<String>,
        start: impl Into<Expr>,
        end: impl Into<Expr>,
        step: u32,
        body: Vec<Stmt>,
    ) -> Self {
        Self::For {
            var: var.into(),
            start: start.into(),
            end: end.into(),
            step,
            body,
        }
    }

    fn write(&self, out: &mut String, depth: usize) {
        let pad = INDENT.repeat(depth);
        match self {
            Self::Let(name, value) => {
                let _ = writeln!(out, "{}let {} = {};", pad, name, value);
            }
            Self::Var(name, ty, init) => match (ty, init) {
                (Some(ty), Some(init)) => {
                    let _ = writeln!(out, "{}var {}: {} = {};", pad, name, ty, init);
                }
                (Some(ty), None) => {
                    let _ = writeln!(out, "{}var {}: {};", pad, name, ty);
                }
                (None, Some(init)) => {
                    let _ = writeln!(out, "{}var {} = {};", pad, name, init);
                }
                (None, None) => {}
            },
            Self::Assign(target, value) => {
                let _ = writeln!(out, "{}{} = {};", pad, target, value);
            }
            Self::AddAssign(target, value) => {
                let _ = writeln!(out, "{}{} += {};", pad, target, value);
            }
            Self::If(cond, then, otherwise) => {
                let _ = writeln!(out, "{}if ({}) {{", pad, cond);
                for s in then {
                    s.write(out, depth + 1);
                }
                if otherwise.is_empty() {
                    let _ = writeln!(out, "{}}}", pad);
                } else {
                    let _ = writeln!(out, "{}}} else {{", pad);
                    for s in otherwise {
                        s.write(out, depth + 1);
                    }
                    let _ = writeln!(out, "{}}}", pad);
                }
            }
            Self::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let advance = if *step == 1 {
                    format!("{}++", var)
                } else {
                    format!("{} += {}u", var, step)
                };
                let _ = writeln!(
                    out,
                    "{}for (var {} = {}; {} < {}; {}) {{",
                    pad, var, start, var, end, advance
                );
                for s in body {
                    s.write(out, depth + 1);
                }
                let _ = writeln!(out, "{}}}", pad);
            }
            Self::Barrier => {
                let _ = writeln!(out, "{}workgroupBarrier();", pad);
            }
            Self::Return(value) => match value {
                Some(v) => {
                    let _ = writeln!(out, "{}return {};", pad, v);
                }
                None => {
                    let _ = writeln!(out, "{}return;", pad);
                }
            },
            Self::Expr(e) => {
                let _ = writeln!(out, "{}{};", pad, e);
            }
        }
    }
}

/// A helper function emitted before the entry point.
#[derive(Debug, Clone)]
pub struct Func {
    pub name: String,
    pub params: Vec<(String, Ty)>,
    pub ret: Option<Ty>,
    pub body: Vec<Stmt>,
}

impl Func {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret: None,
            body: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    pub fn returns(mut self, ty: Ty) -> Self {
        self.ret = Some(ty);
        self
    }

    pub fn body(mut self, stmts: Vec<Stmt>) -> Self {
        self.body = stmts;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindSpace {
    Storage { read_only: bool },
    Uniform,
}

#[derive(Debug, Clone)]
struct BindingDecl {
    index: u32,
    name: String,
    ty: Ty,
    space: BindSpace,
}

#[derive(Debug, Clone)]
struct StructDecl {
    name: String,
    fields: Vec<(String, Ty)>,
}

/// Handle to a `var<workgroup>` array declared on the builder.
///
/// Carries only the name; indexing helpers produce expressions against it so
/// generators never spell shared-memory names twice.
#[derive(Debug, Clone)]
pub struct SharedArray {
    name: String,
}

impl SharedArray {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> Expr {
        Expr::ident(&self.name)
    }

    pub fn at(&self, i: impl Into<Expr>) -> Expr {
        self.expr().index(i)
    }

    pub fn at2(&self, i: impl Into<Expr>, j: impl Into<Expr>) -> Expr {
        self.expr().index(i).index(j)
    }
}

/// Assembles one compute shader module.
///
/// Declaration order is append order, which keeps the rendered text stable
/// for a given variant + parameter set; the dispatcher hashes the render
/// output into its pipeline cache key.
#[derive(Debug, Default)]
pub struct KernelBuilder {
    enable_f16: bool,
    structs: Vec<StructDecl>,
    bindings: Vec<BindingDecl>,
    consts: Vec<(String, Expr)>,
    workgroup_vars: Vec<(String, Ty)>,
    functions: Vec<Func>,
    body: Vec<Stmt>,
    workgroup_size: [u32; 3],
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            workgroup_size: [64, 1, 1],
            ..Self::default()
        }
    }

    /// Emit `enable f16;` at the top of the module.
    pub fn enable_f16(&mut self) -> &mut Self {
        self.enable_f16 = true;
        self
    }

    pub fn workgroup_size(&mut self, size: [u32; 3]) -> &mut Self {
        self.workgroup_size = size;
        self
    }

    pub fn define_struct(
        &mut self,
        name: impl Into<String>,
        fields: Vec<(String, Ty)>,
    ) -> &mut Self {
        self.structs.push(StructDecl {
            name: name.into(),
            fields,
        });
        self
    }

    /// Declare a storage binding at the next binding index.
    pub fn bind_storage(&mut self, name: impl Into<String>, ty: Ty, read_only: bool) -> Expr {
        let name = name.into();
        self.bindings.push(BindingDecl {
            index: self.bindings.len() as u32,
            name: name.clone(),
            ty,
            space: BindSpace::Storage { read_only },
        });
        Expr::Ident(name)
    }

    /// Declare a uniform binding at the next binding index.
    pub fn bind_uniform(&mut self, name: impl Into<String>, ty: Ty) -> Expr {
        let name = name.into();
        self.bindings.push(BindingDecl {
            index: self.bindings.len() as u32,
            name: name.clone(),
            ty,
            space: BindSpace::Uniform,
        });
        Expr::Ident(name)
    }

    /// Module-scope `const name = value;`
    pub fn constant(&mut self, name: impl Into<String>, value: impl Into<Expr>) -> Expr {
        let name = name.into();
        self.consts.push((name.clone(), value.into()));
        Expr::Ident(name)
    }

    /// Declare a `var<workgroup>` array. Zero-initialized per the WGSL spec.
    pub fn workgroup_array(&mut self, name: impl Into<String>, ty: Ty) -> SharedArray {
        let name = name.into();
        self.workgroup_vars.push((name.clone(), ty));
        SharedArray { name }
    }

    pub fn function(&mut self, f: Func) -> &mut Self {
        self.functions.push(f);
        self
    }

    pub fn stmt(&mut self, s: Stmt) -> &mut Self {
        self.body.push(s);
        self
    }

    pub fn stmts(&mut self, stmts: Vec<Stmt>) -> &mut Self {
        self.body.extend(stmts);
        self
    }

    /// Render the module. The entry point is always `main`, with the
    /// invocation builtins bound to fixed names and a flattened
    /// `workgroup_idx` available to the body.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.enable_f16 {
            out.push_str("enable f16;\n\n");
        }

        for s in &self.structs {
            let _ = writeln!(out, "struct {} {{", s.name);
            for (name, ty) in &s.fields {
                let _ = writeln!(out, "{}{}: {},", INDENT, name, ty);
            }
            out.push_str("};\n\n");
        }

        for b in &self.bindings {
            let space = match b.space {
                BindSpace::Storage { read_only: true } => "var<storage, read>",
                BindSpace::Storage { read_only: false } => "var<storage, read_write>",
                BindSpace::Uniform => "var<uniform>",
            };
            let _ = writeln!(
                out,
                "@group(0) @binding({}) {} {}: {};",
                b.index, space, b.name, b.ty
            );
        }
        if !self.bindings.is_empty() {
            out.push('\n');
        }

        for (name, value) in &self.consts {
            let _ = writeln!(out, "const {} = {};", name, value);
        }
        if !self.consts.is_empty() {
            out.push('\n');
        }

        for (name, ty) in &self.workgroup_vars {
            let _ = writeln!(out, "var<workgroup> {}: {};", name, ty);
        }
        if !self.workgroup_vars.is_empty() {
            out.push('\n');
        }

        for f in &self.functions {
            let _ = write!(out, "fn {}(", f.name);
            for (i, (name, ty)) in f.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: {}", name, ty);
            }
            out.push(')');
            if let Some(ret) = &f.ret {
                let _ = write!(out, " -> {}", ret);
            }
            out.push_str(" {\n");
            for s in &f.body {
                s.write(&mut out, 1);
            }
            out.push_str("}\n\n");
        }

        let [x, y, z] = self.workgroup_size;
        let _ = writeln!(out, "@compute @workgroup_size({}, {}, {})", x, y, z);
        out.push_str("fn main(\n");
        out.push_str("  @builtin(local_invocation_id) local_id: vec3<u32>,\n");
        out.push_str("  @builtin(local_invocation_index) local_idx: u32,\n");
        out.push_str("  @builtin(workgroup_id) workgroup_id: vec3<u32>,\n");
        out.push_str("  @builtin(global_invocation_id) global_id: vec3<u32>,\n");
        out.push_str("  @builtin(num_workgroups) num_workgroups: vec3<u32>,\n");
        out.push_str(") {\n");
        out.push_str(
            "  let workgroup_idx = workgroup_id.z * num_workgroups.x * num_workgroups.y \
             + workgroup_id.y * num_workgroups.x + workgroup_id.x;\n",
        );
        for s in &self.body {
            s.write(&mut out, 1);
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arith_precedence() {
        let e = (Expr::ident("a") + Expr::ident("b")) * Expr::ident("c");
        assert_eq!(e.to_string(), "(a + b) * c");

        let e = Expr::ident("a") + Expr::ident("b") * Expr::ident("c");
        assert_eq!(e.to_string(), "a + b * c");

        // subtraction is not associative; rhs keeps its parens
        let e = Expr::ident("a") - (Expr::ident("b") - Expr::ident("c"));
        assert_eq!(e.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_mixed_classes_parenthesized() {
        let e = (Expr::ident("word").shr(Expr::ident("bits"))).bitand(Expr::u32(0xF));
        assert_eq!(e.to_string(), "(word >> bits) & 15u");

        let e = (Expr::ident("a") + Expr::u32(1)).shl(Expr::u32(3));
        assert_eq!(e.to_string(), "(a + 1u) << 3u");
    }

    #[test]
    fn test_literals() {
        assert_eq!(Expr::u32(8).to_string(), "8u");
        assert_eq!(Expr::float(8.0).to_string(), "8.0");
        assert_eq!(Expr::float(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_index_member_call() {
        let e = Expr::ident("tile").index(Expr::ident("i")).member("x");
        assert_eq!(e.to_string(), "tile[i].x");

        let e = Expr::call("unpack4xU8", vec![Expr::ident("w").bitand(Expr::hex(0x0F0F0F0F))]);
        assert_eq!(e.to_string(), "unpack4xU8(w & 0x0F0F0F0Fu)");
    }

    #[test]
    fn test_stmt_render() {
        let mut out = String::new();
        Stmt::let_("x", Expr::u32(3)).write(&mut out, 1);
        Stmt::for_step(
            "i",
            Expr::u32(0),
            Expr::ident("n"),
            4,
            vec![Stmt::add_assign(Expr::ident("acc"), Expr::ident("i"))],
        )
        .write(&mut out, 1);
        assert_eq!(
            out,
            "  let x = 3u;\n  for (var i = 0u; i < n; i += 4u) {\n    acc += i;\n  }\n"
        );
    }

    #[test]
    fn test_builder_render_shape() {
        let mut b = KernelBuilder::new();
        b.enable_f16();
        b.workgroup_size([128, 1, 1]);
        let a = b.bind_storage("a_data", Ty::runtime_array(Ty::Vec(4, DType::F16)), true);
        b.bind_storage("output", Ty::runtime_array(Ty::Scalar(DType::F16)), false);
        let shared = b.workgroup_array("sub_a", Ty::array(Ty::Vec(4, DType::F16), 32));
        b.stmt(Stmt::assign(shared.at(Expr::ident("local_idx")), a.index(Expr::u32(0))));
        b.stmt(Stmt::Barrier);
        let src = b.render();

        assert!(src.starts_with("enable f16;"));
        assert!(src.contains("@group(0) @binding(0) var<storage, read> a_data: array<vec4<f16>>;"));
        assert!(src.contains("@group(0) @binding(1) var<storage, read_write> output: array<f16>;"));
        assert!(src.contains("var<workgroup> sub_a: array<vec4<f16>, 32>;"));
        assert!(src.contains("@compute @workgroup_size(128, 1, 1)"));
        assert!(src.contains("let workgroup_idx = workgroup_id.z * num_workgroups.x * num_workgroups.y + workgroup_id.y * num_workgroups.x + workgroup_id.x;"));
        assert!(src.contains("workgroupBarrier();"));
    }

    #[test]
    fn test_helper_function_render() {
        let mut b = KernelBuilder::new();
        b.function(
            Func::new("double_it")
                .param("v", Ty::U32)
                .returns(Ty::U32)
                .body(vec![Stmt::Return(Some(Expr::ident("v") * Expr::u32(2)))]),
        );
        let src = b.render();
        assert!(src.contains("fn double_it(v: u32) -> u32 {\n  return v * 2u;\n}"));
    }
}
