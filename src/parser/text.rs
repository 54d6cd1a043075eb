//! Line-oriented parser for the textual IR.
//!
//! ```text
//! ; a counting loop
//! func @count() -> i32 {
//! entry:
//!   br header
//! header:
//!   %x = phi i32 [ 10, entry ], [ %x.next, body ]
//!   %c = icmp slt i32 %x, 100
//!   cbr %c, body, exit
//! body:
//!   %x.next = add i32 %x, 1
//!   br header
//! exit:
//!   ret i32 %x
//! }
//! ```
//!
//! Integer literals used as operands are interned as constants at the
//! instruction's type width. Sigma nodes are ordinary `phi` lines whose
//! destination name starts with the e-SSA marker.

use super::{ParseError, ParseResult};
use crate::ir::{
    BinOp, Block, CastOp, Function, Inst, Module, Predicate, Terminator, ValueId, ValueKind,
};
use std::collections::HashMap;

/// Parse a module from its textual form.
pub fn parse(source: &str) -> ParseResult<Module> {
    let mut module = Module::new("module");
    let mut lines = source
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, strip_comment(l)))
        .filter(|(_, l)| !l.is_empty());

    while let Some((line_no, line)) = lines.next() {
        let tokens = tokenize(&line);
        if tokens.first().map(String::as_str) != Some("func") {
            return Err(ParseError::Syntax {
                line: line_no,
                message: format!("expected 'func', found '{}'", tokens[0]),
            });
        }

        let mut body = Vec::new();
        let mut closed = false;
        for (no, l) in lines.by_ref() {
            if l == "}" {
                closed = true;
                break;
            }
            body.push((no, tokenize(&l)));
        }
        if !closed {
            return Err(ParseError::UnexpectedEof);
        }

        let func = FunctionParser::new(&mut module).parse(line_no, &tokens, body)?;
        module.add_function(func);
    }

    Ok(module)
}

fn strip_comment(line: &str) -> String {
    line.split(';').next().unwrap_or("").trim().to_string()
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    for c in line.chars() {
        match c {
            c if c.is_whitespace() => {
                if !cur.is_empty() {
                    tokens.push(std::mem::take(&mut cur));
                }
            }
            ',' | '(' | ')' | '[' | ']' | ':' | '=' | '{' | '}' => {
                if !cur.is_empty() {
                    tokens.push(std::mem::take(&mut cur));
                }
                tokens.push(c.to_string());
            }
            _ => cur.push(c),
        }
    }
    if !cur.is_empty() {
        tokens.push(cur);
    }
    tokens
}

fn parse_bits(tok: &str) -> ParseResult<u32> {
    tok.strip_prefix('i')
        .and_then(|b| b.parse::<u32>().ok())
        .filter(|&b| (1..=64).contains(&b))
        .ok_or_else(|| ParseError::InvalidType(tok.to_string()))
}

const BINOPS: &[(&str, BinOp)] = &[
    ("add", BinOp::Add),
    ("sub", BinOp::Sub),
    ("mul", BinOp::Mul),
    ("udiv", BinOp::UDiv),
    ("sdiv", BinOp::SDiv),
    ("urem", BinOp::URem),
    ("srem", BinOp::SRem),
    ("shl", BinOp::Shl),
    ("lshr", BinOp::LShr),
    ("ashr", BinOp::AShr),
    ("and", BinOp::And),
    ("or", BinOp::Or),
    ("xor", BinOp::Xor),
];

fn binop(tok: &str) -> Option<BinOp> {
    BINOPS.iter().find(|(n, _)| *n == tok).map(|(_, op)| *op)
}

fn predicate(tok: &str) -> Option<Predicate> {
    Some(match tok {
        "eq" => Predicate::Eq,
        "ne" => Predicate::Ne,
        "slt" => Predicate::Slt,
        "sle" => Predicate::Sle,
        "sgt" => Predicate::Sgt,
        "sge" => Predicate::Sge,
        "ult" => Predicate::Ult,
        "ule" => Predicate::Ule,
        "ugt" => Predicate::Ugt,
        "uge" => Predicate::Uge,
        _ => None?,
    })
}

fn cast_op(tok: &str) -> Option<CastOp> {
    Some(match tok {
        "trunc" => CastOp::Trunc,
        "zext" => CastOp::ZExt,
        "sext" => CastOp::SExt,
        _ => None?,
    })
}

enum Parsed {
    Inst(Inst),
    Term(Terminator),
}

struct FunctionParser<'m> {
    module: &'m mut Module,
    symtab: HashMap<String, ValueId>,
    store_count: usize,
}

impl<'m> FunctionParser<'m> {
    fn new(module: &'m mut Module) -> Self {
        Self { module, symtab: HashMap::new(), store_count: 0 }
    }

    fn parse(
        mut self,
        header_line: usize,
        header: &[String],
        body: Vec<(usize, Vec<String>)>,
    ) -> ParseResult<Function> {
        let (mut func, param_decls) = self.parse_header(header_line, header)?;

        for (name, bits) in param_decls {
            if self.symtab.contains_key(&name) {
                return Err(ParseError::DuplicateValue { line: header_line, name });
            }
            let id = self.module.values.new_value(
                &name,
                bits,
                ValueKind::Arg { func: func.name.clone() },
            );
            self.symtab.insert(name, id);
            func.params.push(id);
        }

        // Split the body into labelled blocks.
        let mut blocks: Vec<(String, Vec<(usize, Vec<String>)>)> = Vec::new();
        for (no, tokens) in body {
            if tokens.len() == 2 && tokens[1] == ":" {
                let label = tokens[0].clone();
                if blocks.iter().any(|(l, _)| *l == label) {
                    return Err(ParseError::DuplicateBlock { line: no, label });
                }
                blocks.push((label, Vec::new()));
            } else if let Some((_, insts)) = blocks.last_mut() {
                insts.push((no, tokens));
            } else {
                return Err(ParseError::Syntax {
                    line: no,
                    message: "instruction before first block label".into(),
                });
            }
        }

        // First pass: register every defined value so later blocks can be
        // referenced by earlier ones (loop phis).
        for (label, insts) in &blocks {
            for (no, tokens) in insts {
                let Some((name, bits)) = Self::def_of(*no, tokens)? else { continue };
                if self.symtab.contains_key(&name) {
                    return Err(ParseError::DuplicateValue { line: *no, name });
                }
                let id = self.module.values.new_value(
                    &name,
                    bits,
                    ValueKind::Inst { func: func.name.clone(), block: label.clone() },
                );
                self.symtab.insert(name, id);
            }
        }

        // Second pass: build instructions with all operands resolvable.
        for (label, insts) in blocks {
            let mut block = Block::new(&label);
            for (no, tokens) in insts {
                if block.term.is_some() {
                    return Err(ParseError::Syntax {
                        line: no,
                        message: "instruction after terminator".into(),
                    });
                }
                match self.parse_line(no, &func.name, &label, &tokens)? {
                    Parsed::Inst(inst) => block.push(inst),
                    Parsed::Term(term) => block.set_term(term),
                }
            }
            func.add_block(block);
        }

        func.rebuild_cfg();
        Ok(func)
    }

    /// `func @name(%a: i32, %b: i64, ...) -> i32 {`
    fn parse_header(
        &mut self,
        line: usize,
        tokens: &[String],
    ) -> ParseResult<(Function, Vec<(String, u32)>)> {
        let err = |message: &str| ParseError::Syntax { line, message: message.into() };

        let name = tokens
            .get(1)
            .and_then(|t| t.strip_prefix('@'))
            .ok_or_else(|| err("expected '@name' after 'func'"))?;
        let mut func = Function::new(name);

        if tokens.get(2).map(String::as_str) != Some("(") {
            return Err(err("expected '(' after function name"));
        }

        let mut params = Vec::new();
        let mut i = 3;
        while i < tokens.len() && tokens[i] != ")" {
            match tokens[i].as_str() {
                "," => i += 1,
                "..." => {
                    func.variadic = true;
                    i += 1;
                }
                t if t.starts_with('%') => {
                    if tokens.get(i + 1).map(String::as_str) != Some(":") {
                        return Err(err("expected ':' after parameter name"));
                    }
                    let bits =
                        parse_bits(tokens.get(i + 2).ok_or(ParseError::UnexpectedEof)?)?;
                    params.push((t[1..].to_string(), bits));
                    i += 3;
                }
                t => {
                    return Err(err(&format!("unexpected token '{}' in parameter list", t)));
                }
            }
        }
        if i >= tokens.len() {
            return Err(ParseError::UnexpectedEof);
        }
        i += 1;

        if tokens.get(i).map(String::as_str) == Some("->") {
            let ty = tokens.get(i + 1).ok_or(ParseError::UnexpectedEof)?;
            if ty != "void" {
                func.ret_bits = Some(parse_bits(ty)?);
            }
            i += 2;
        }

        if tokens.get(i).map(String::as_str) != Some("{") {
            return Err(err("expected '{' at end of function header"));
        }

        Ok((func, params))
    }

    /// Name and width of the value a line defines, if any.
    fn def_of(line: usize, tokens: &[String]) -> ParseResult<Option<(String, u32)>> {
        if !tokens[0].starts_with('%') || tokens.get(1).map(String::as_str) != Some("=") {
            return Ok(None);
        }
        let name = tokens[0][1..].to_string();
        let op = tokens
            .get(2)
            .ok_or(ParseError::UnexpectedEof)?
            .as_str();

        let bits = if cast_op(op).is_some() {
            parse_bits(tokens.last().ok_or(ParseError::UnexpectedEof)?)?
        } else if op == "icmp" {
            1
        } else if binop(op).is_some() || matches!(op, "phi" | "load" | "call") {
            parse_bits(tokens.get(3).ok_or(ParseError::UnexpectedEof)?)?
        } else {
            return Err(ParseError::Syntax {
                line,
                message: format!("unknown opcode '{}'", op),
            });
        };

        Ok(Some((name, bits)))
    }

    fn lookup(&self, line: usize, tok: &str) -> ParseResult<ValueId> {
        let name = &tok[1..];
        self.symtab
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::UnknownValue { line, name: name.to_string() })
    }

    /// `%name` resolves through the symbol table; a literal is interned as
    /// a constant at the instruction's width.
    fn operand(&mut self, line: usize, tok: &str, bits: u32) -> ParseResult<ValueId> {
        if tok.starts_with('%') {
            return self.lookup(line, tok);
        }
        tok.parse::<i128>()
            .map(|v| self.module.values.const_int(v, bits))
            .map_err(|_| ParseError::Syntax {
                line,
                message: format!("expected value or integer, found '{}'", tok),
            })
    }

    fn expect(&self, line: usize, tokens: &[String], i: usize, what: &str) -> ParseResult<()> {
        if tokens.get(i).map(String::as_str) == Some(what) {
            Ok(())
        } else {
            Err(ParseError::Syntax {
                line,
                message: format!("expected '{}'", what),
            })
        }
    }

    fn parse_line(
        &mut self,
        line: usize,
        func: &str,
        block: &str,
        t: &[String],
    ) -> ParseResult<Parsed> {
        let err = |message: String| ParseError::Syntax { line, message };

        match t[0].as_str() {
            "br" => {
                let target = t.get(1).ok_or(ParseError::UnexpectedEof)?.clone();
                Ok(Parsed::Term(Terminator::Br { target }))
            }

            "cbr" => {
                // cbr %c, then, else
                let cond = self.lookup(line, t.get(1).ok_or(ParseError::UnexpectedEof)?)?;
                self.expect(line, t, 2, ",")?;
                let then_block = t.get(3).ok_or(ParseError::UnexpectedEof)?.clone();
                self.expect(line, t, 4, ",")?;
                let else_block = t.get(5).ok_or(ParseError::UnexpectedEof)?.clone();
                Ok(Parsed::Term(Terminator::CondBr { cond, then_block, else_block }))
            }

            "switch" => {
                // switch i32 %x, default [ 0: a, 1: b ]
                let bits = parse_bits(t.get(1).ok_or(ParseError::UnexpectedEof)?)?;
                let cond = self.operand(line, t.get(2).ok_or(ParseError::UnexpectedEof)?, bits)?;
                self.expect(line, t, 3, ",")?;
                let default = t.get(4).ok_or(ParseError::UnexpectedEof)?.clone();
                self.expect(line, t, 5, "[")?;

                let mut cases = Vec::new();
                let mut i = 6;
                while i < t.len() && t[i] != "]" {
                    if t[i] == "," {
                        i += 1;
                        continue;
                    }
                    let value = t[i]
                        .parse::<i128>()
                        .map_err(|_| err(format!("expected case value, found '{}'", t[i])))?;
                    self.expect(line, t, i + 1, ":")?;
                    let target = t.get(i + 2).ok_or(ParseError::UnexpectedEof)?.clone();
                    cases.push((value, target));
                    i += 3;
                }
                Ok(Parsed::Term(Terminator::Switch { cond, default, cases }))
            }

            "ret" => match t.get(1).map(String::as_str) {
                None | Some("void") => Ok(Parsed::Term(Terminator::Ret { value: None })),
                Some(ty) => {
                    let bits = parse_bits(ty)?;
                    let v = self.operand(line, t.get(2).ok_or(ParseError::UnexpectedEof)?, bits)?;
                    Ok(Parsed::Term(Terminator::Ret { value: Some(v) }))
                }
            },

            "store" => {
                // store i32 %v, %p
                let bits = parse_bits(t.get(1).ok_or(ParseError::UnexpectedEof)?)?;
                let value = self.operand(line, t.get(2).ok_or(ParseError::UnexpectedEof)?, bits)?;
                self.expect(line, t, 3, ",")?;
                let addr = self.operand(line, t.get(4).ok_or(ParseError::UnexpectedEof)?, bits)?;

                let dst = self.module.values.new_value(
                    format!("store.{}", self.store_count),
                    bits,
                    ValueKind::Inst { func: func.to_string(), block: block.to_string() },
                );
                self.store_count += 1;
                Ok(Parsed::Inst(Inst::Store { dst, addr, value }))
            }

            "call" => {
                // call void @f(%a, %b)
                let (callee, args) = self.parse_call_tail(line, t, 1)?;
                Ok(Parsed::Inst(Inst::Call { dst: None, callee, args }))
            }

            tok if tok.starts_with('%') => {
                let dst = self.lookup(line, tok)?;
                self.expect(line, t, 1, "=")?;
                let op = t.get(2).ok_or(ParseError::UnexpectedEof)?.as_str();

                if let Some(bop) = binop(op) {
                    // %x = add i32 %a, %b
                    let bits = parse_bits(t.get(3).ok_or(ParseError::UnexpectedEof)?)?;
                    let lhs =
                        self.operand(line, t.get(4).ok_or(ParseError::UnexpectedEof)?, bits)?;
                    self.expect(line, t, 5, ",")?;
                    let rhs =
                        self.operand(line, t.get(6).ok_or(ParseError::UnexpectedEof)?, bits)?;
                    return Ok(Parsed::Inst(Inst::Binary { dst, op: bop, lhs, rhs }));
                }

                if let Some(cop) = cast_op(op) {
                    // %x = trunc i32 %a to i16
                    let bits = parse_bits(t.get(3).ok_or(ParseError::UnexpectedEof)?)?;
                    let src =
                        self.operand(line, t.get(4).ok_or(ParseError::UnexpectedEof)?, bits)?;
                    self.expect(line, t, 5, "to")?;
                    parse_bits(t.get(6).ok_or(ParseError::UnexpectedEof)?)?;
                    return Ok(Parsed::Inst(Inst::Cast { dst, op: cop, src }));
                }

                match op {
                    "icmp" => {
                        // %c = icmp slt i32 %a, %b
                        let pred_tok = t.get(3).ok_or(ParseError::UnexpectedEof)?;
                        let pred = predicate(pred_tok)
                            .ok_or_else(|| err(format!("unknown predicate '{}'", pred_tok)))?;
                        let bits = parse_bits(t.get(4).ok_or(ParseError::UnexpectedEof)?)?;
                        let lhs =
                            self.operand(line, t.get(5).ok_or(ParseError::UnexpectedEof)?, bits)?;
                        self.expect(line, t, 6, ",")?;
                        let rhs =
                            self.operand(line, t.get(7).ok_or(ParseError::UnexpectedEof)?, bits)?;
                        Ok(Parsed::Inst(Inst::Icmp { dst, pred, lhs, rhs }))
                    }

                    "phi" => {
                        // %x = phi i32 [ %a, entry ], [ 10, loop ]
                        let bits = parse_bits(t.get(3).ok_or(ParseError::UnexpectedEof)?)?;
                        let mut incoming = Vec::new();
                        let mut i = 4;
                        while i < t.len() {
                            if t[i] == "," {
                                i += 1;
                                continue;
                            }
                            self.expect(line, t, i, "[")?;
                            let v = self.operand(
                                line,
                                t.get(i + 1).ok_or(ParseError::UnexpectedEof)?,
                                bits,
                            )?;
                            self.expect(line, t, i + 2, ",")?;
                            let pred = t.get(i + 3).ok_or(ParseError::UnexpectedEof)?.clone();
                            self.expect(line, t, i + 4, "]")?;
                            incoming.push((pred, v));
                            i += 5;
                        }
                        if incoming.is_empty() {
                            return Err(err("phi needs at least one incoming".into()));
                        }
                        Ok(Parsed::Inst(Inst::Phi { dst, incoming }))
                    }

                    "load" => {
                        // %x = load i32, %p
                        let bits = parse_bits(t.get(3).ok_or(ParseError::UnexpectedEof)?)?;
                        self.expect(line, t, 4, ",")?;
                        let addr =
                            self.operand(line, t.get(5).ok_or(ParseError::UnexpectedEof)?, bits)?;
                        Ok(Parsed::Inst(Inst::Load { dst, addr }))
                    }

                    "call" => {
                        // %x = call i32 @f(%a)
                        parse_bits(t.get(3).ok_or(ParseError::UnexpectedEof)?)?;
                        let (callee, args) = self.parse_call_tail(line, t, 4)?;
                        Ok(Parsed::Inst(Inst::Call { dst: Some(dst), callee, args }))
                    }

                    other => Err(err(format!("unknown opcode '{}'", other))),
                }
            }

            other => Err(err(format!("unexpected token '{}'", other))),
        }
    }

    /// `@callee ( operands )` starting at `t[i]`, where `t[i]` may be the
    /// return type for value-producing calls.
    fn parse_call_tail(
        &mut self,
        line: usize,
        t: &[String],
        i: usize,
    ) -> ParseResult<(String, Vec<ValueId>)> {
        let mut i = i;
        if t.get(i).map(String::as_str) == Some("void") || t.get(i).map_or(false, |s| s.starts_with('i') && parse_bits(s).is_ok())
        {
            i += 1;
        }

        let callee = t
            .get(i)
            .and_then(|s| s.strip_prefix('@'))
            .ok_or_else(|| ParseError::Syntax {
                line,
                message: "expected '@callee'".into(),
            })?
            .to_string();
        self.expect(line, t, i + 1, "(")?;

        let mut args = Vec::new();
        let mut j = i + 2;
        while j < t.len() && t[j] != ")" {
            if t[j] == "," {
                j += 1;
                continue;
            }
            // Literal arguments default to 32 bits; the callee's formal
            // carries the authoritative width.
            let v = self.operand(line, &t[j], 32)?;
            args.push(v);
            j += 1;
        }
        Ok((callee, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_counting_loop() {
        let src = r#"
; a counting loop
func @count() -> i32 {
entry:
  br header
header:
  %x = phi i32 [ 10, entry ], [ %x.next, body ]
  %c = icmp slt i32 %x, 100
  cbr %c, body, exit
body:
  %x.next = add i32 %x, 1
  br header
exit:
  ret i32 %x
}
"#;
        let m = parse(src).unwrap();
        let f = m.get_function("count").unwrap();
        assert_eq!(f.blocks.len(), 4);
        assert_eq!(f.ret_bits, Some(32));

        let x = m.lookup("count", "x").unwrap();
        assert_eq!(m.values.bits(x), 32);

        let header = f.get_block("header").unwrap();
        assert_eq!(header.insts.len(), 2);
        assert!(matches!(header.terminator(), Some(Terminator::CondBr { .. })));
    }

    #[test]
    fn parse_params_calls_and_casts() {
        let src = r#"
func @f(%p: i32) -> i32 {
entry:
  %w = sext i32 %p to i64
  %n = trunc i64 %w to i32
  %r = call i32 @g(%n, 7)
  ret i32 %r
}
func @g(%a: i32, %b: i32) -> i32 {
entry:
  %s = add i32 %a, %b
  ret i32 %s
}
"#;
        let m = parse(src).unwrap();
        assert_eq!(m.functions.len(), 2);
        let f = m.get_function("f").unwrap();
        assert_eq!(f.params.len(), 1);

        let entry = f.get_block("entry").unwrap();
        assert!(matches!(entry.insts[0], Inst::Cast { op: CastOp::SExt, .. }));
        match &entry.insts[2] {
            Inst::Call { dst, callee, args } => {
                assert!(dst.is_some());
                assert_eq!(callee, "g");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn parse_switch_and_store() {
        let src = r#"
func @f(%x: i32, %p: i32) {
entry:
  store i32 %x, %p
  %l = load i32, %p
  switch i32 %x, other [ 0: zero, 5: five ]
zero:
  ret
five:
  ret
other:
  ret
}
"#;
        let m = parse(src).unwrap();
        let f = m.get_function("f").unwrap();
        assert!(f.ret_bits.is_none());
        match f.get_block("entry").unwrap().terminator() {
            Some(Terminator::Switch { default, cases, .. }) => {
                assert_eq!(default, "other");
                assert_eq!(cases, &[(0, "zero".to_string()), (5, "five".to_string())]);
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn negative_literals_and_variadic() {
        let src = r#"
func @f(%x: i32, ...) -> i32 {
entry:
  %y = add i32 %x, -5
  ret i32 %y
}
"#;
        let m = parse(src).unwrap();
        let f = m.get_function("f").unwrap();
        assert!(f.variadic);
        match &f.get_block("entry").unwrap().insts[0] {
            Inst::Binary { rhs, .. } => assert_eq!(m.values.const_value(*rhs), Some(-5)),
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn unknown_value_is_an_error() {
        let src = "func @f() {\nentry:\n  %y = add i32 %nope, 1\n  ret\n}\n";
        match parse(src) {
            Err(ParseError::UnknownValue { name, .. }) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownValue, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let src = "func @f() {\nentry:\n  %y = add i32 1, 1\n  %y = add i32 2, 2\n  ret\n}\n";
        assert!(matches!(parse(src), Err(ParseError::DuplicateValue { .. })));
    }

    #[test]
    fn instruction_after_terminator_is_an_error() {
        let src = "func @f() {\nentry:\n  ret\n  %y = add i32 1, 1\n}\n";
        assert!(matches!(parse(src), Err(ParseError::Syntax { .. })));
    }
}
