//! Recursive-descent parser for the Hawk language.
//!
//! One function per precedence level, mirroring the operator ladder:
//! assignment, ternary, logical-or, logical-and, `in`, match, bit-or,
//! bit-xor, bit-and, equality, relational, shift, concatenation,
//! additive, multiplicative, unary, exponent, inner unary, increment,
//! primary.
//!
//! Identifiers resolve at parse time into scoped slots: locals
//! (right-to-left), then parameters, then globals; anything else becomes
//! an implicit named variable or an error depending on the implicit
//! trait. User calls to names with no definition yet are recorded and
//! verified once the whole script has been read.

use std::collections::HashMap;
use std::rc::Rc;

use hawk_core::{ErrorKind, HawkError, Loc, Num, Trait};
use hawk_regex::{CompileOpts, Regex};

use crate::ast::{
    AssignOp, BinOp, Expr, ExprKind, FunDef, IncOp, InType, OutType, Param, ParamMode, Pattern,
    PatternAction, Program, Stmt, StmtKind, UnOp,
};
use crate::hawk::{Hawk, IntrinsicSpec};
use crate::source::{SourceIo, SourceReader};
use crate::token::{Lexer, TokKind, Token};

/// Which top-level body the statement being parsed belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyCtx {
    Begin,
    End,
    Pattern,
    Fun,
}

pub(crate) struct Parser<'h, 'io> {
    hawk: &'h Hawk,
    lexer: Lexer<'io>,
    tok: Token,

    globals: Vec<String>,
    named: Vec<String>,
    params: Vec<Param>,
    locals: Vec<String>,
    cur_fun: Option<String>,
    funs: HashMap<String, Rc<FunDef>>,
    unresolved: HashMap<String, Loc>,

    begins: Vec<Stmt>,
    ends: Vec<Stmt>,
    chain: Vec<PatternAction>,

    implicit: bool,
    implicit_stack: Vec<bool>,
    rtx_stack_limit: Option<usize>,

    expr_depth: usize,
    block_depth: usize,
    loop_depth: usize,
    ctx: BodyCtx,
}

impl<'h, 'io> Parser<'h, 'io> {
    pub fn run(hawk: &'h Hawk, io: &'io mut dyn SourceIo) -> Result<Program, HawkError> {
        let reader = SourceReader::new(io, hawk.opts().depths.include)?;
        let lexer = Lexer::new(reader, hawk.opts().traits);
        let mut p = Parser {
            hawk,
            lexer,
            tok: Token {
                kind: TokKind::Eof,
                loc: Loc::default(),
            },
            globals: hawk.globals().to_vec(),
            named: Vec::new(),
            params: Vec::new(),
            locals: Vec::new(),
            cur_fun: None,
            funs: HashMap::new(),
            unresolved: HashMap::new(),
            begins: Vec::new(),
            ends: Vec::new(),
            chain: Vec::new(),
            implicit: hawk.opts().traits.contains(Trait::IMPLICIT),
            implicit_stack: Vec::new(),
            rtx_stack_limit: None,
            expr_depth: 0,
            block_depth: 0,
            loop_depth: 0,
            ctx: BodyCtx::Pattern,
        };
        p.advance()?;
        let mut result = p.parse_program();
        if let Err(e) = p.lexer.reader.finish() {
            if result.is_ok() {
                result = Err(e);
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // token plumbing

    fn advance(&mut self) -> Result<(), HawkError> {
        loop {
            self.tok = self.lexer.next_token()?;
            for _ in 0..self.lexer.reader.take_popped() {
                if let Some(f) = self.implicit_stack.pop() {
                    self.implicit = f;
                }
            }
            if self.tok.kind == TokKind::Newline && !self.traits().contains(Trait::NEWLINE) {
                continue;
            }
            return Ok(());
        }
    }

    fn traits(&self) -> Trait {
        self.hawk.opts().traits
    }

    fn is(&self, kind: &TokKind) -> bool {
        self.tok.kind == *kind
    }

    fn err(&self, kind: ErrorKind) -> HawkError {
        HawkError::new(kind).at(self.tok.loc.clone())
    }

    fn err_msg(&self, kind: ErrorKind, msg: impl Into<String>) -> HawkError {
        HawkError::with_msg(kind, msg).at(self.tok.loc.clone())
    }

    fn expect(&mut self, kind: TokKind, ek: ErrorKind) -> Result<(), HawkError> {
        if self.tok.kind == kind {
            self.advance()
        } else {
            Err(self.err(ek))
        }
    }

    fn skip_newlines(&mut self) -> Result<(), HawkError> {
        while self.is(&TokKind::Newline) {
            self.advance()?;
        }
        Ok(())
    }

    fn at_terminator(&self) -> bool {
        matches!(
            self.tok.kind,
            TokKind::Semicolon | TokKind::Newline | TokKind::Rbrace | TokKind::Eof
        )
    }

    /// Consume a statement terminator: `;` or a significant newline;
    /// `}` and end-of-input terminate without being consumed.
    fn end_statement(&mut self) -> Result<(), HawkError> {
        match self.tok.kind {
            TokKind::Semicolon | TokKind::Newline => self.advance(),
            TokKind::Rbrace | TokKind::Eof => Ok(()),
            _ => Err(self.err(ErrorKind::Stmtend)),
        }
    }

    // ------------------------------------------------------------------
    // program units

    fn parse_program(&mut self) -> Result<Program, HawkError> {
        loop {
            while matches!(self.tok.kind, TokKind::Newline | TokKind::Semicolon) {
                self.advance()?;
            }
            if self.is(&TokKind::Eof) {
                break;
            }
            self.parse_progunit()?;
        }
        // every recorded call must have found its definition by now
        for (name, loc) in &self.unresolved {
            if !self.funs.contains_key(name) {
                return Err(HawkError::with_msg(
                    ErrorKind::Undef,
                    format!("function '{}' not defined", name),
                )
                .at(loc.clone()));
            }
        }
        Ok(Program {
            begins: std::mem::take(&mut self.begins),
            ends: std::mem::take(&mut self.ends),
            chain: std::mem::take(&mut self.chain),
            funs: std::mem::take(&mut self.funs),
            globals: std::mem::take(&mut self.globals),
            named: std::mem::take(&mut self.named),
            rtx_stack_limit: self.rtx_stack_limit,
        })
    }

    fn parse_progunit(&mut self) -> Result<(), HawkError> {
        match self.tok.kind.clone() {
            TokKind::XGlobal => {
                self.advance()?;
                self.parse_global_decl()
            }
            TokKind::XInclude | TokKind::XIncludeOnce => {
                let once = self.tok.kind == TokKind::XIncludeOnce;
                self.advance()?;
                self.parse_include(once)
            }
            TokKind::XPragma => {
                self.advance()?;
                self.parse_pragma()
            }
            TokKind::Function => {
                self.advance()?;
                self.parse_function()
            }
            TokKind::Begin => {
                let loc = self.tok.loc.clone();
                self.advance()?;
                self.skip_newlines()?;
                if !self.is(&TokKind::Lbrace) {
                    return Err(HawkError::new(ErrorKind::Lbrace).at(loc));
                }
                self.advance()?;
                self.ctx = BodyCtx::Begin;
                let body = self.parse_block(loc)?;
                self.begins.push(body);
                Ok(())
            }
            TokKind::End => {
                let loc = self.tok.loc.clone();
                self.advance()?;
                self.skip_newlines()?;
                if !self.is(&TokKind::Lbrace) {
                    return Err(HawkError::new(ErrorKind::Lbrace).at(loc));
                }
                self.advance()?;
                self.ctx = BodyCtx::End;
                let body = self.parse_block(loc)?;
                self.ends.push(body);
                Ok(())
            }
            TokKind::Lbrace => {
                let loc = self.tok.loc.clone();
                self.require_pablock()?;
                self.advance()?;
                self.ctx = BodyCtx::Pattern;
                let body = self.parse_block(loc.clone())?;
                self.chain.push(PatternAction {
                    pattern: Pattern::All,
                    action: Some(body),
                    loc,
                });
                Ok(())
            }
            _ => self.parse_pattern_action(),
        }
    }

    fn require_pablock(&self) -> Result<(), HawkError> {
        if !self.traits().contains(Trait::PABLOCK) {
            return Err(self.err_msg(
                ErrorKind::Perm,
                "pattern-action blocks not allowed in this mode",
            ));
        }
        Ok(())
    }

    fn parse_global_decl(&mut self) -> Result<(), HawkError> {
        loop {
            let TokKind::Ident(name) = self.tok.kind.clone() else {
                return Err(self.err_msg(ErrorKind::Invalid, "variable name expected"));
            };
            if self.hawk.find_intrinsic(&name).is_some() {
                return Err(self.err_msg(
                    ErrorKind::KwRed,
                    format!("'{}' is an intrinsic function", name),
                ));
            }
            if self.globals.iter().any(|g| *g == name) {
                return Err(self.err_msg(ErrorKind::DupGbl, format!("duplicate global '{}'", name)));
            }
            self.globals.push(name);
            self.advance()?;
            if self.is(&TokKind::Comma) {
                self.advance()?;
                self.skip_newlines()?;
                continue;
            }
            break;
        }
        self.end_statement()
    }

    fn parse_include(&mut self, once: bool) -> Result<(), HawkError> {
        let TokKind::Str(name) = self.tok.kind.clone() else {
            return Err(self.err(ErrorKind::InclStr));
        };
        let loc = self.tok.loc.clone();
        let pushed = self.lexer.reader.push_include(&name, once, &loc)?;
        if pushed {
            self.implicit_stack.push(self.implicit);
        }
        // the next token comes from the included file (or right after the
        // directive when a once-include was skipped)
        self.advance()
    }

    fn parse_pragma(&mut self) -> Result<(), HawkError> {
        let TokKind::Ident(name) = self.tok.kind.clone() else {
            return Err(self.err_msg(ErrorKind::Invalid, "pragma name expected"));
        };
        self.advance()?;
        match name.as_str() {
            "implicit" => {
                let on = match &self.tok.kind {
                    TokKind::Ident(v) if v == "on" => true,
                    TokKind::Ident(v) if v == "off" => false,
                    _ => {
                        return Err(self.err_msg(
                            ErrorKind::Invalid,
                            "'on' or 'off' expected after '@pragma implicit'",
                        ))
                    }
                };
                self.implicit = on;
                self.advance()?;
            }
            "stack_limit" => {
                let TokKind::Int(v) = self.tok.kind else {
                    return Err(self.err_msg(
                        ErrorKind::Invalid,
                        "number expected after '@pragma stack_limit'",
                    ));
                };
                self.rtx_stack_limit =
                    Some(hawk_core::options::clamp_stack_limit(v.max(0) as usize));
                self.advance()?;
            }
            other => {
                return Err(
                    self.err_msg(ErrorKind::Invalid, format!("unknown pragma '{}'", other))
                )
            }
        }
        self.end_statement()
    }

    fn parse_function(&mut self) -> Result<(), HawkError> {
        let loc = self.tok.loc.clone();
        let TokKind::Ident(name) = self.tok.kind.clone() else {
            return Err(self.err_msg(ErrorKind::Invalid, "function name expected"));
        };
        if self.hawk.find_intrinsic(&name).is_some() {
            return Err(self.err_msg(ErrorKind::KwRed, format!("'{}' is an intrinsic", name)));
        }
        if self.funs.contains_key(&name) {
            return Err(self.err_msg(ErrorKind::FnRed, format!("function '{}' redefined", name)));
        }
        if self.globals.iter().any(|g| *g == name) {
            return Err(self.err_msg(
                ErrorKind::GblRed,
                format!("'{}' is already a global variable", name),
            ));
        }
        self.advance()?;
        self.expect(TokKind::Lparen, ErrorKind::Lparen)?;

        let mut params: Vec<Param> = Vec::new();
        self.skip_newlines()?;
        while !self.is(&TokKind::Rparen) {
            let mode = if self.is(&TokKind::Band) {
                self.advance()?;
                ParamMode::Reference
            } else {
                ParamMode::Value
            };
            let TokKind::Ident(pname) = self.tok.kind.clone() else {
                return Err(self.err_msg(ErrorKind::Invalid, "parameter name expected"));
            };
            if params.iter().any(|p| p.name == pname) {
                return Err(
                    self.err_msg(ErrorKind::DupPar, format!("duplicate parameter '{}'", pname))
                );
            }
            if self.traits().contains(Trait::STRICT_NAMING) && pname == name {
                return Err(self.err_msg(
                    ErrorKind::DupPar,
                    format!("parameter '{}' shadows the function", pname),
                ));
            }
            params.push(Param { name: pname, mode });
            self.advance()?;
            self.skip_newlines()?;
            if self.is(&TokKind::Comma) {
                self.advance()?;
                self.skip_newlines()?;
            }
        }
        self.advance()?; // ')'
        self.skip_newlines()?;
        if !self.is(&TokKind::Lbrace) {
            return Err(self.err(ErrorKind::Lbrace));
        }
        let body_loc = self.tok.loc.clone();
        self.advance()?;

        let saved_loop = std::mem::take(&mut self.loop_depth);
        let saved_ctx = self.ctx;
        self.ctx = BodyCtx::Fun;
        self.cur_fun = Some(name.clone());
        self.params = params.clone();
        self.locals.clear();
        let body = self.parse_block(body_loc);
        self.params.clear();
        self.locals.clear();
        self.cur_fun = None;
        self.ctx = saved_ctx;
        self.loop_depth = saved_loop;
        let body = body?;

        self.unresolved.remove(&name);
        self.funs.insert(
            name.clone(),
            Rc::new(FunDef {
                name,
                params,
                body,
                loc,
            }),
        );
        Ok(())
    }

    fn parse_pattern_action(&mut self) -> Result<(), HawkError> {
        self.require_pablock()?;
        self.ctx = BodyCtx::Pattern;
        let loc = self.tok.loc.clone();
        let first = self.parse_expr()?;
        let pattern = if self.is(&TokKind::Comma) {
            self.advance()?;
            self.skip_newlines()?;
            let second = self.parse_expr()?;
            Pattern::Range(first, second)
        } else {
            Pattern::Expr(first)
        };
        let action = if self.is(&TokKind::Lbrace) {
            let bloc = self.tok.loc.clone();
            self.advance()?;
            Some(self.parse_block(bloc)?)
        } else {
            // blockless pattern prints $0; needs a terminator
            self.end_statement()?;
            None
        };
        self.chain.push(PatternAction {
            pattern,
            action,
            loc,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // statements

    /// Parse a block body; the opening `{` is already consumed.
    fn parse_block(&mut self, loc: Loc) -> Result<Stmt, HawkError> {
        self.block_depth += 1;
        let r = self.parse_block_inner(&loc);
        self.block_depth -= 1;
        r
    }

    fn parse_block_inner(&mut self, loc: &Loc) -> Result<Stmt, HawkError> {
        let depths = self.hawk.opts().depths;
        if depths.block_parse > 0 && self.block_depth > depths.block_parse {
            return Err(self.err(ErrorKind::BlockNest));
        }

        let local_start = self.locals.len();
        let mut nlocals = 0usize;

        // local declarations come first
        loop {
            self.skip_newlines()?;
            if !self.is(&TokKind::XLocal) {
                break;
            }
            self.advance()?;
            loop {
                let TokKind::Ident(name) = self.tok.kind.clone() else {
                    return Err(self.err_msg(ErrorKind::Invalid, "local variable name expected"));
                };
                if self.locals[local_start..].iter().any(|l| *l == name) {
                    return Err(
                        self.err_msg(ErrorKind::DupLcl, format!("duplicate local '{}'", name))
                    );
                }
                if self.params.iter().any(|p| p.name == name) {
                    return Err(self.err_msg(
                        ErrorKind::DupLcl,
                        format!("local '{}' shadows a parameter", name),
                    ));
                }
                if self.traits().contains(Trait::STRICT_NAMING)
                    && self.cur_fun.as_deref() == Some(name.as_str())
                {
                    return Err(self.err_msg(
                        ErrorKind::DupLcl,
                        format!("local '{}' shadows the function", name),
                    ));
                }
                self.locals.push(name);
                nlocals += 1;
                self.advance()?;
                if self.is(&TokKind::Comma) {
                    self.advance()?;
                    self.skip_newlines()?;
                    continue;
                }
                break;
            }
            self.end_statement()?;
        }

        let mut body = Vec::new();
        loop {
            self.skip_newlines()?;
            while self.is(&TokKind::Semicolon) {
                self.advance()?;
                self.skip_newlines()?;
            }
            if self.is(&TokKind::Rbrace) {
                self.advance()?;
                break;
            }
            if self.is(&TokKind::Eof) {
                return Err(self.err(ErrorKind::Rbrace));
            }
            body.push(self.parse_statement()?);
        }

        self.locals.truncate(local_start);
        Ok(Stmt {
            kind: StmtKind::Block { nlocals, body },
            loc: loc.clone(),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, HawkError> {
        self.skip_newlines()?;
        let loc = self.tok.loc.clone();
        let kind = match self.tok.kind.clone() {
            TokKind::Lbrace => {
                self.advance()?;
                return self.parse_block(loc);
            }
            TokKind::Semicolon => {
                self.advance()?;
                StmtKind::Null
            }
            TokKind::If => {
                self.advance()?;
                return self.parse_if(loc);
            }
            TokKind::While => {
                self.advance()?;
                return self.parse_while(loc);
            }
            TokKind::Do => {
                self.advance()?;
                return self.parse_dowhile(loc);
            }
            TokKind::For => {
                self.advance()?;
                return self.parse_for(loc);
            }
            TokKind::Break => {
                self.advance()?;
                if self.loop_depth == 0 {
                    return Err(HawkError::new(ErrorKind::BreakNoLoop).at(loc));
                }
                self.end_statement()?;
                StmtKind::Break
            }
            TokKind::Continue => {
                self.advance()?;
                if self.loop_depth == 0 {
                    return Err(HawkError::new(ErrorKind::ContinueNoLoop).at(loc));
                }
                self.end_statement()?;
                StmtKind::Continue
            }
            TokKind::Return => {
                self.advance()?;
                if self.ctx != BodyCtx::Fun {
                    return Err(HawkError::new(ErrorKind::ReturnOnly).at(loc));
                }
                let val = if self.at_terminator() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.end_statement()?;
                StmtKind::Return(val)
            }
            TokKind::Exit | TokKind::XAbort => {
                let abort = self.tok.kind == TokKind::XAbort;
                self.advance()?;
                let val = if self.at_terminator() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.end_statement()?;
                StmtKind::Exit { val, abort }
            }
            TokKind::Next => {
                self.advance()?;
                match self.ctx {
                    BodyCtx::Begin => return Err(HawkError::new(ErrorKind::NextBeg).at(loc)),
                    BodyCtx::End => return Err(HawkError::new(ErrorKind::NextEnd).at(loc)),
                    _ => {}
                }
                self.end_statement()?;
                StmtKind::Next
            }
            TokKind::NextFile | TokKind::NextOfile => {
                let out = self.tok.kind == TokKind::NextOfile;
                self.advance()?;
                match self.ctx {
                    BodyCtx::Begin => return Err(HawkError::new(ErrorKind::NextFBeg).at(loc)),
                    BodyCtx::End => return Err(HawkError::new(ErrorKind::NextFEnd).at(loc)),
                    _ => {}
                }
                self.end_statement()?;
                StmtKind::NextFile { out }
            }
            TokKind::Delete => {
                self.advance()?;
                let var = self.parse_var_target()?;
                self.end_statement()?;
                StmtKind::Delete(var)
            }
            TokKind::XReset => {
                self.advance()?;
                let var = self.parse_var_target()?;
                self.end_statement()?;
                StmtKind::Reset(var)
            }
            TokKind::Print | TokKind::Printf => {
                let formatted = self.tok.kind == TokKind::Printf;
                self.advance()?;
                let (args, out) = self.parse_print_tail(formatted)?;
                self.end_statement()?;
                if formatted {
                    StmtKind::Printf { args, out }
                } else {
                    StmtKind::Print { args, out }
                }
            }
            _ => {
                let e = self.parse_expr()?;
                self.end_statement()?;
                StmtKind::Expr(e)
            }
        };
        Ok(Stmt { kind, loc })
    }

    fn parse_if(&mut self, loc: Loc) -> Result<Stmt, HawkError> {
        self.expect(TokKind::Lparen, ErrorKind::Lparen)?;
        self.skip_newlines()?;
        let test = self.parse_expr()?;
        self.skip_newlines()?;
        self.expect(TokKind::Rparen, ErrorKind::Rparen)?;
        self.skip_newlines()?;
        let then = Box::new(self.parse_statement()?);
        self.skip_newlines()?;
        let alt = if self.is(&TokKind::Else) {
            self.advance()?;
            self.skip_newlines()?;
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If { test, then, alt },
            loc,
        })
    }

    fn parse_while(&mut self, loc: Loc) -> Result<Stmt, HawkError> {
        self.expect(TokKind::Lparen, ErrorKind::Lparen)?;
        self.skip_newlines()?;
        let test = self.parse_expr()?;
        self.skip_newlines()?;
        self.expect(TokKind::Rparen, ErrorKind::Rparen)?;
        self.skip_newlines()?;
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        Ok(Stmt {
            kind: StmtKind::While {
                test,
                body: Box::new(body?),
            },
            loc,
        })
    }

    fn parse_dowhile(&mut self, loc: Loc) -> Result<Stmt, HawkError> {
        self.skip_newlines()?;
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        let body = body?;
        self.skip_newlines()?;
        if !self.is(&TokKind::While) {
            return Err(self.err_msg(ErrorKind::Stmtend, "'while' expected after 'do' body"));
        }
        self.advance()?;
        self.expect(TokKind::Lparen, ErrorKind::Lparen)?;
        self.skip_newlines()?;
        let test = self.parse_expr()?;
        self.skip_newlines()?;
        self.expect(TokKind::Rparen, ErrorKind::Rparen)?;
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::DoWhile {
                test,
                body: Box::new(body),
            },
            loc,
        })
    }

    fn parse_for(&mut self, loc: Loc) -> Result<Stmt, HawkError> {
        self.expect(TokKind::Lparen, ErrorKind::Lparen)?;
        self.skip_newlines()?;

        let mut init = None;
        if !self.is(&TokKind::Semicolon) {
            let first = self.parse_expr()?;
            if self.is(&TokKind::Rparen) {
                // `for (var in container)`
                if let ExprKind::Binary {
                    op: BinOp::In,
                    lhs,
                    rhs,
                } = first.kind
                {
                    self.advance()?;
                    self.skip_newlines()?;
                    if !lhs.is_lvalue() && !matches!(lhs.kind, ExprKind::Group(_)) {
                        return Err(self.err_msg(
                            ErrorKind::Invalid,
                            "loop variable of for-in must be assignable",
                        ));
                    }
                    self.loop_depth += 1;
                    let body = self.parse_statement();
                    self.loop_depth -= 1;
                    return Ok(Stmt {
                        kind: StmtKind::ForIn {
                            var: *lhs,
                            list: *rhs,
                            body: Box::new(body?),
                        },
                        loc,
                    });
                }
                return Err(self.err_msg(ErrorKind::Stmtend, "';' expected in 'for'"));
            }
            init = Some(first);
        }
        self.expect(TokKind::Semicolon, ErrorKind::Stmtend)?;
        self.skip_newlines()?;

        let test = if self.is(&TokKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokKind::Semicolon, ErrorKind::Stmtend)?;
        self.skip_newlines()?;

        let incr = if self.is(&TokKind::Rparen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokKind::Rparen, ErrorKind::Rparen)?;
        self.skip_newlines()?;

        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        Ok(Stmt {
            kind: StmtKind::For {
                init,
                test,
                incr,
                body: Box::new(body?),
            },
            loc,
        })
    }

    /// A bare variable or indexed variable, for `delete` and `@reset`.
    fn parse_var_target(&mut self) -> Result<Expr, HawkError> {
        let loc = self.tok.loc.clone();
        let TokKind::Ident(name) = self.tok.kind.clone() else {
            return Err(self.err_msg(ErrorKind::Invalid, "variable expected"));
        };
        self.advance()?;
        let e = self.parse_primary_ident(name, loc)?;
        if !e.is_lvalue() {
            return Err(self.err_msg(ErrorKind::Invalid, "variable expected"));
        }
        Ok(e)
    }

    fn parse_print_tail(
        &mut self,
        formatted: bool,
    ) -> Result<(Vec<Expr>, Option<(OutType, Expr)>), HawkError> {
        let mut args: Vec<Expr> = Vec::new();
        let mut out = None;

        let starts_redir = matches!(
            self.tok.kind,
            TokKind::Gt | TokKind::Rs | TokKind::Bor | TokKind::Lor
        );
        if !self.at_terminator() && !starts_redir {
            args.push(self.parse_expr()?);
            while self.is(&TokKind::Comma) {
                self.advance()?;
                self.skip_newlines()?;
                args.push(self.parse_expr()?);
            }
            // `print (a, b)` passes the group members as the argument list
            if args.len() == 1 && matches!(args[0].kind, ExprKind::Group(_)) {
                if let ExprKind::Group(items) = args.pop().expect("one arg").kind {
                    args = items;
                }
            }
            // `print x > "f"` parses as a comparison first; split the
            // trailing redirection back out unless it was parenthesized
            let split = match args.last() {
                Some(last) if !last.paren => match &last.kind {
                    ExprKind::Binary { op: BinOp::Gt, .. } => Some(OutType::File),
                    ExprKind::Binary { op: BinOp::Shr, .. } => Some(OutType::ApFile),
                    ExprKind::Binary { op: BinOp::Bor, .. } => Some(OutType::Pipe),
                    ExprKind::Binary { op: BinOp::Lor, .. }
                        if self.traits().contains(Trait::RW_PIPE) =>
                    {
                        Some(OutType::RwPipe)
                    }
                    _ => None,
                },
                _ => None,
            };
            if let Some(out_type) = split {
                let last = args.pop().expect("a trailing argument exists");
                if let ExprKind::Binary { lhs, rhs, .. } = last.kind {
                    args.push(*lhs);
                    out = Some((out_type, *rhs));
                }
            }
        }

        if out.is_none() {
            let out_type = match self.tok.kind {
                TokKind::Gt => Some(OutType::File),
                TokKind::Rs => Some(OutType::ApFile),
                TokKind::Bor => Some(OutType::Pipe),
                TokKind::Lor if self.traits().contains(Trait::RW_PIPE) => Some(OutType::RwPipe),
                _ => None,
            };
            if let Some(out_type) = out_type {
                self.advance()?;
                self.skip_newlines()?;
                let dest = self.parse_expr()?;
                out = Some((out_type, dest));
            }
        }

        if formatted && args.is_empty() {
            return Err(self.err_msg(ErrorKind::TooFewArgs, "printf requires a format argument"));
        }
        Ok((args, out))
    }

    // ------------------------------------------------------------------
    // expressions

    fn parse_expr(&mut self) -> Result<Expr, HawkError> {
        self.expr_depth += 1;
        let depths = self.hawk.opts().depths;
        let r = if depths.expr_parse > 0 && self.expr_depth > depths.expr_parse {
            Err(self.err(ErrorKind::ExprNest))
        } else {
            self.parse_expr_inner()
        };
        self.expr_depth -= 1;
        r
    }

    fn parse_expr_inner(&mut self) -> Result<Expr, HawkError> {
        let lhs = self.parse_ternary()?;
        let op = match self.tok.kind {
            TokKind::Assn => AssignOp::None,
            TokKind::PlusAssn => AssignOp::Plus,
            TokKind::MinusAssn => AssignOp::Minus,
            TokKind::MulAssn => AssignOp::Mul,
            TokKind::DivAssn => AssignOp::Div,
            TokKind::IdivAssn => AssignOp::Idiv,
            TokKind::ModAssn => AssignOp::Mod,
            TokKind::ExpAssn => AssignOp::Exp,
            TokKind::ConcatAssn => AssignOp::Concat,
            TokKind::RsAssn => AssignOp::Shr,
            TokKind::LsAssn => AssignOp::Shl,
            TokKind::BandAssn => AssignOp::Band,
            TokKind::BxorAssn => AssignOp::Bxor,
            TokKind::BorAssn => AssignOp::Bor,
            _ => return Ok(lhs),
        };
        if !lhs.is_lvalue() {
            return Err(self.err_msg(ErrorKind::Invalid, "assignment to a non-variable"));
        }
        let loc = lhs.loc.clone();
        self.advance()?;
        self.skip_newlines()?;
        let rhs = self.parse_expr()?;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            loc,
        ))
    }

    fn parse_ternary(&mut self) -> Result<Expr, HawkError> {
        let test = self.parse_logical_or()?;
        if !self.is(&TokKind::Quest) {
            return Ok(test);
        }
        let loc = test.loc.clone();
        self.advance()?;
        self.skip_newlines()?;
        let then = self.parse_expr()?;
        self.skip_newlines()?;
        if !self.is(&TokKind::Colon) {
            return Err(self.err_msg(ErrorKind::Invalid, "':' expected in conditional"));
        }
        self.advance()?;
        self.skip_newlines()?;
        let alt = self.parse_expr()?;
        Ok(Expr::new(
            ExprKind::Cond {
                test: Box::new(test),
                then: Box::new(then),
                alt: Box::new(alt),
            },
            loc,
        ))
    }

    fn parse_logical_or(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_logical_and()?;
        while self.is(&TokKind::Lor) {
            let loc = self.tok.loc.clone();
            self.advance()?;
            // `cmd || getline` is the two-way-pipe read
            if self.is(&TokKind::Getline) && self.traits().contains(Trait::RW_PIPE) {
                self.advance()?;
                let var = self.parse_getline_var()?;
                lhs = Expr::new(
                    ExprKind::Getline {
                        var,
                        in_type: InType::RwPipe,
                        src: Some(Box::new(lhs)),
                    },
                    loc,
                );
                continue;
            }
            self.skip_newlines()?;
            let rhs = self.parse_logical_and()?;
            lhs = self.binary(BinOp::Lor, lhs, rhs, loc)?;
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_in()?;
        while self.is(&TokKind::Land) {
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_in()?;
            lhs = self.binary(BinOp::Land, lhs, rhs, loc)?;
        }
        Ok(lhs)
    }

    fn parse_in(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_regex_match()?;
        while self.is(&TokKind::In) {
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_regex_match()?;
            if !rhs.is_lvalue() {
                return Err(self.err_msg(ErrorKind::Invalid, "'in' requires a container variable"));
            }
            lhs = self.binary(BinOp::In, lhs, rhs, loc)?;
        }
        Ok(lhs)
    }

    fn parse_regex_match(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_bitwise_or()?;
        loop {
            let op = match self.tok.kind {
                TokKind::Ma => BinOp::Ma,
                TokKind::Nm => BinOp::Nm,
                _ => return Ok(lhs),
            };
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_bitwise_or()?;
            lhs = self.binary(op, lhs, rhs, loc)?;
        }
    }

    fn parse_bitwise_or(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_bitwise_xor()?;
        while self.is(&TokKind::Bor) {
            let loc = self.tok.loc.clone();
            self.advance()?;
            // `cmd | getline` reads from a pipe
            if self.is(&TokKind::Getline) {
                self.advance()?;
                let var = self.parse_getline_var()?;
                lhs = Expr::new(
                    ExprKind::Getline {
                        var,
                        in_type: InType::Pipe,
                        src: Some(Box::new(lhs)),
                    },
                    loc,
                );
                continue;
            }
            self.skip_newlines()?;
            let rhs = self.parse_bitwise_xor()?;
            lhs = self.binary(BinOp::Bor, lhs, rhs, loc)?;
        }
        Ok(lhs)
    }

    fn parse_bitwise_xor(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_bitwise_and()?;
        while self.is(&TokKind::Bxor) {
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_bitwise_and()?;
            lhs = self.binary(BinOp::Bxor, lhs, rhs, loc)?;
        }
        Ok(lhs)
    }

    fn parse_bitwise_and(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_equality()?;
        while self.is(&TokKind::Band) {
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_equality()?;
            lhs = self.binary(BinOp::Band, lhs, rhs, loc)?;
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.tok.kind {
                TokKind::Eq => BinOp::Eq,
                TokKind::Ne => BinOp::Ne,
                TokKind::Teq => BinOp::Teq,
                TokKind::Tne => BinOp::Tne,
                _ => return Ok(lhs),
            };
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_relational()?;
            lhs = self.binary(op, lhs, rhs, loc)?;
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.tok.kind {
                TokKind::Gt => BinOp::Gt,
                TokKind::Ge => BinOp::Ge,
                TokKind::Lt => BinOp::Lt,
                TokKind::Le => BinOp::Le,
                _ => return Ok(lhs),
            };
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_shift()?;
            lhs = self.binary(op, lhs, rhs, loc)?;
        }
    }

    fn parse_shift(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_concat()?;
        loop {
            let op = match self.tok.kind {
                TokKind::Ls => BinOp::Shl,
                TokKind::Rs => BinOp::Shr,
                _ => return Ok(lhs),
            };
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_concat()?;
            lhs = self.binary(op, lhs, rhs, loc)?;
        }
    }

    fn parse_concat(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let explicit = self.is(&TokKind::Concat);
            let implicit = self.traits().contains(Trait::BLANK_CONCAT)
                && matches!(
                    self.tok.kind,
                    TokKind::Int(_)
                        | TokKind::Flt(_)
                        | TokKind::Str(_)
                        | TokKind::Mbs(_)
                        | TokKind::Ident(_)
                        | TokKind::Dollar
                        | TokKind::Lparen
                        | TokKind::LNot
                );
            if !explicit && !implicit {
                return Ok(lhs);
            }
            let loc = self.tok.loc.clone();
            if explicit {
                self.advance()?;
                self.skip_newlines()?;
            }
            let rhs = self.parse_additive()?;
            lhs = self.binary(BinOp::Concat, lhs, rhs, loc)?;
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.tok.kind {
                TokKind::Plus => BinOp::Plus,
                TokKind::Minus => BinOp::Minus,
                _ => return Ok(lhs),
            };
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs, loc)?;
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, HawkError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.tok.kind {
                TokKind::Mul => BinOp::Mul,
                TokKind::Div => BinOp::Div,
                TokKind::Idiv => BinOp::Idiv,
                TokKind::Mod => BinOp::Mod,
                _ => return Ok(lhs),
            };
            let loc = self.tok.loc.clone();
            self.advance()?;
            self.skip_newlines()?;
            let rhs = self.parse_unary()?;
            lhs = self.binary(op, lhs, rhs, loc)?;
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, HawkError> {
        let op = match self.tok.kind {
            TokKind::Plus => UnOp::Plus,
            TokKind::Minus => UnOp::Minus,
            TokKind::LNot => UnOp::LNot,
            TokKind::Bnot => UnOp::BNot,
            _ => return self.parse_exponent(),
        };
        let loc = self.tok.loc.clone();
        self.advance()?;
        self.skip_newlines()?;
        let operand = self.parse_unary()?;
        self.unary(op, operand, loc)
    }

    fn parse_exponent(&mut self) -> Result<Expr, HawkError> {
        let lhs = self.parse_unary_exp()?;
        if !self.is(&TokKind::Exp) {
            return Ok(lhs);
        }
        let loc = self.tok.loc.clone();
        self.advance()?;
        self.skip_newlines()?;
        // right-associative
        let rhs = self.parse_exponent()?;
        self.binary(BinOp::Exp, lhs, rhs, loc)
    }

    fn parse_unary_exp(&mut self) -> Result<Expr, HawkError> {
        let op = match self.tok.kind {
            TokKind::Plus => UnOp::Plus,
            TokKind::Minus => UnOp::Minus,
            TokKind::LNot => UnOp::LNot,
            TokKind::Bnot => UnOp::BNot,
            _ => return self.parse_increment(),
        };
        let loc = self.tok.loc.clone();
        self.advance()?;
        self.skip_newlines()?;
        let operand = self.parse_unary_exp()?;
        self.unary(op, operand, loc)
    }

    fn parse_increment(&mut self) -> Result<Expr, HawkError> {
        let pre = match self.tok.kind {
            TokKind::PlusPlus => Some(IncOp::Plus),
            TokKind::MinusMinus => Some(IncOp::Minus),
            _ => None,
        };
        if let Some(op) = pre {
            let loc = self.tok.loc.clone();
            self.advance()?;
            let operand = self.parse_increment()?;
            if !operand.is_lvalue() {
                return Err(self.err_msg(ErrorKind::Invalid, "'++'/'--' needs a variable"));
            }
            return Ok(Expr::new(
                ExprKind::IncPre {
                    op,
                    operand: Box::new(operand),
                },
                loc,
            ));
        }

        let mut e = self.parse_primary()?;
        loop {
            let op = match self.tok.kind {
                TokKind::PlusPlus => IncOp::Plus,
                TokKind::MinusMinus => IncOp::Minus,
                _ => break,
            };
            if !e.is_lvalue() {
                break;
            }
            let loc = self.tok.loc.clone();
            self.advance()?;
            e = Expr::new(
                ExprKind::IncPost {
                    op,
                    operand: Box::new(e),
                },
                loc,
            );
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<Expr, HawkError> {
        let loc = self.tok.loc.clone();
        match self.tok.kind.clone() {
            TokKind::Int(v) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::Int(v), loc))
            }
            TokKind::Flt(v) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::Flt(v), loc))
            }
            TokKind::Str(s) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::Str(s), loc))
            }
            TokKind::Mbs(b) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::Mbs(b), loc))
            }
            TokKind::Div | TokKind::DivAssn | TokKind::Idiv => {
                let pattern = match self.tok.kind {
                    TokKind::Div => self.lexer.read_regex_rest("", &loc)?,
                    // `/=` at a primary position opens a regex starting '='
                    TokKind::DivAssn => self.lexer.read_regex_rest("=", &loc)?,
                    // a lexed `//` is the empty pattern, already closed
                    _ => String::new(),
                };
                let rex = self.compile_rex(&pattern, &loc)?;
                self.advance()?;
                Ok(Expr::new(ExprKind::Rex(rex), loc))
            }
            TokKind::Dollar => {
                self.advance()?;
                let val = self.parse_primary()?;
                Ok(Expr::new(ExprKind::Positional(Box::new(val)), loc))
            }
            TokKind::Lparen => {
                self.advance()?;
                self.skip_newlines()?;
                let mut items = vec![self.parse_expr()?];
                self.skip_newlines()?;
                while self.is(&TokKind::Comma) {
                    self.advance()?;
                    self.skip_newlines()?;
                    items.push(self.parse_expr()?);
                    self.skip_newlines()?;
                }
                self.expect(TokKind::Rparen, ErrorKind::Rparen)?;
                if items.len() == 1 {
                    let mut inner = items.pop().expect("one item");
                    inner.paren = true;
                    Ok(inner)
                } else {
                    let mut group = Expr::new(ExprKind::Group(items), loc);
                    group.paren = true;
                    Ok(group)
                }
            }
            TokKind::Getline => {
                self.advance()?;
                let var = self.parse_getline_var()?;
                let (in_type, src) = if self.is(&TokKind::Lt) {
                    self.advance()?;
                    let src = self.parse_primary()?;
                    (InType::File, Some(Box::new(src)))
                } else {
                    (InType::Console, None)
                };
                Ok(Expr::new(ExprKind::Getline { var, in_type, src }, loc))
            }
            TokKind::Ident(name) => {
                self.advance()?;
                self.parse_primary_ident(name, loc)
            }
            _ => Err(self.err_msg(
                ErrorKind::Invalid,
                format!("unexpected token in expression: {:?}", self.tok.kind),
            )),
        }
    }

    /// Optional target variable after `getline`.
    fn parse_getline_var(&mut self) -> Result<Option<Box<Expr>>, HawkError> {
        if !matches!(self.tok.kind, TokKind::Ident(_) | TokKind::Dollar) {
            return Ok(None);
        }
        let e = self.parse_primary()?;
        if !e.is_lvalue() {
            return Err(self.err_msg(ErrorKind::Invalid, "getline target must be a variable"));
        }
        Ok(Some(Box::new(e)))
    }

    /// An identifier just consumed; resolve it against the scope tables
    /// and the call context.
    fn parse_primary_ident(&mut self, name: String, loc: Loc) -> Result<Expr, HawkError> {
        // module-qualified intrinsic: `mod::fn(...)`
        if self.is(&TokKind::DblColon) {
            self.advance()?;
            let TokKind::Ident(seg) = self.tok.kind.clone() else {
                return Err(self.err_msg(ErrorKind::Invalid, "name expected after '::'"));
            };
            self.advance()?;
            let full = format!("{}::{}", name, seg);
            let Some(spec) = self.hawk.find_intrinsic(&full).cloned() else {
                return Err(
                    self.err_msg(ErrorKind::Undef, format!("unknown function '{}'", full))
                );
            };
            if !self.is(&TokKind::Lparen) {
                return Err(self.err_msg(ErrorKind::Invalid, format!("'{}' must be called", full)));
            }
            let args = self.parse_call_args()?;
            self.check_intrinsic_args(&full, &spec, &args, &loc)?;
            return Ok(Expr::new(
                ExprKind::CallIntrinsic {
                    name: full,
                    spec,
                    args,
                },
                loc,
            ));
        }

        if let Some(spec) = self.hawk.find_intrinsic(&name).cloned() {
            if !self.is(&TokKind::Lparen) {
                return Err(self.err_msg(
                    ErrorKind::Invalid,
                    format!("intrinsic '{}' must be called", name),
                ));
            }
            let args = self.parse_call_args()?;
            self.check_intrinsic_args(&name, &spec, &args, &loc)?;
            return Ok(Expr::new(
                ExprKind::CallIntrinsic { name, spec, args },
                loc,
            ));
        }

        if let Some(base) = self.resolve_var(&name) {
            if self.is(&TokKind::Lparen) {
                let var = Expr::new(base, loc.clone());
                let args = self.parse_call_args()?;
                return Ok(Expr::new(
                    ExprKind::CallVar {
                        var: Box::new(var),
                        args,
                    },
                    loc,
                ));
            }
            if self.is(&TokKind::Lbrack) {
                let idx = self.parse_index_list()?;
                let kind = match base {
                    ExprKind::Named(n) => ExprKind::NamedIdx(n, idx),
                    ExprKind::Global(i) => ExprKind::GlobalIdx(i, idx),
                    ExprKind::Local(i) => ExprKind::LocalIdx(i, idx),
                    ExprKind::Arg(i) => ExprKind::ArgIdx(i, idx),
                    _ => unreachable!("resolve_var returns variables"),
                };
                return Ok(Expr::new(kind, loc));
            }
            return Ok(Expr::new(base, loc));
        }

        let is_fun =
            self.funs.contains_key(&name) || self.cur_fun.as_deref() == Some(name.as_str());
        if is_fun {
            if self.is(&TokKind::Lparen) {
                let args = self.parse_call_args()?;
                return Ok(Expr::new(ExprKind::CallUser { name, args }, loc));
            }
            return Ok(Expr::new(ExprKind::FunRef(name), loc));
        }

        if self.is(&TokKind::Lparen) {
            // possibly a call to a function defined later
            self.unresolved.entry(name.clone()).or_insert(loc.clone());
            let args = self.parse_call_args()?;
            return Ok(Expr::new(ExprKind::CallUser { name, args }, loc));
        }

        if !self.implicit {
            return Err(HawkError::with_msg(
                ErrorKind::Undef,
                format!("undefined identifier '{}'", name),
            )
            .at(loc));
        }
        if !self.named.contains(&name) {
            self.named.push(name.clone());
        }
        if self.is(&TokKind::Lbrack) {
            let idx = self.parse_index_list()?;
            return Ok(Expr::new(ExprKind::NamedIdx(name, idx), loc));
        }
        Ok(Expr::new(ExprKind::Named(name), loc))
    }

    fn resolve_var(&self, name: &str) -> Option<ExprKind> {
        if let Some(i) = self.locals.iter().rposition(|l| l == name) {
            return Some(ExprKind::Local(i));
        }
        if let Some(i) = self.params.iter().position(|p| p.name == name) {
            return Some(ExprKind::Arg(i));
        }
        if let Some(i) = self.globals.iter().position(|g| g == name) {
            return Some(ExprKind::Global(i));
        }
        if self.named.iter().any(|n| n == name) {
            return Some(ExprKind::Named(name.to_string()));
        }
        None
    }

    /// `[` e1 `,` e2 … `]`; the list forms a SUBSEP-joined key.
    fn parse_index_list(&mut self) -> Result<Vec<Expr>, HawkError> {
        debug_assert!(self.is(&TokKind::Lbrack));
        self.advance()?;
        self.skip_newlines()?;
        let mut idx = vec![self.parse_expr()?];
        while self.is(&TokKind::Comma) {
            self.advance()?;
            self.skip_newlines()?;
            idx.push(self.parse_expr()?);
        }
        if !self.is(&TokKind::Rbrack) {
            return Err(self.err_msg(ErrorKind::Invalid, "']' expected"));
        }
        self.advance()?;
        Ok(idx)
    }

    /// `(` args `)`; the opening parenthesis is the current token.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, HawkError> {
        debug_assert!(self.is(&TokKind::Lparen));
        self.advance()?;
        self.skip_newlines()?;
        let mut args = Vec::new();
        if self.is(&TokKind::Rparen) {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_newlines()?;
            if self.is(&TokKind::Comma) {
                self.advance()?;
                self.skip_newlines()?;
                continue;
            }
            break;
        }
        self.expect(TokKind::Rparen, ErrorKind::Rparen)?;
        Ok(args)
    }

    fn check_intrinsic_args(
        &self,
        name: &str,
        spec: &IntrinsicSpec,
        args: &[Expr],
        loc: &Loc,
    ) -> Result<(), HawkError> {
        if args.len() < spec.min_args {
            return Err(HawkError::with_msg(
                ErrorKind::TooFewArgs,
                format!("'{}' needs at least {} argument(s)", name, spec.min_args),
            )
            .at(loc.clone()));
        }
        if args.len() > spec.max_args {
            return Err(HawkError::with_msg(
                ErrorKind::TooManyArgs,
                format!("'{}' takes at most {} argument(s)", name, spec.max_args),
            )
            .at(loc.clone()));
        }
        for (i, arg) in args.iter().enumerate() {
            if spec.arg_kind(i) == 'r' && !arg.is_lvalue() {
                return Err(HawkError::with_msg(
                    ErrorKind::Invalid,
                    format!("argument {} to '{}' must be a variable", i + 1, name),
                )
                .at(arg.loc.clone()));
            }
        }
        Ok(())
    }

    fn compile_rex(&self, pattern: &str, loc: &Loc) -> Result<Rc<hawk_core::Rex>, HawkError> {
        let bounds = self.traits().contains(Trait::REX_BOUND);
        let cased = Regex::compile(
            pattern,
            CompileOpts {
                icase: false,
                bounds,
            },
        )
        .map_err(|e| HawkError::from(e).at(loc.clone()))?;
        let folded = Regex::compile(pattern, CompileOpts { icase: true, bounds })
            .map_err(|e| HawkError::from(e).at(loc.clone()))?;
        Ok(Rc::new(hawk_core::Rex {
            source: pattern.to_string(),
            cased,
            folded,
        }))
    }

    // ------------------------------------------------------------------
    // folding

    fn binary(&self, op: BinOp, lhs: Expr, rhs: Expr, loc: Loc) -> Result<Expr, HawkError> {
        if let Some(kind) = self.fold_binary(op, &lhs, &rhs, &loc)? {
            return Ok(Expr::new(kind, loc));
        }
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            loc,
        ))
    }

    fn unary(&self, op: UnOp, operand: Expr, loc: Loc) -> Result<Expr, HawkError> {
        match (op, lit(&operand)) {
            (UnOp::Minus, Some(Num::Int(v))) => Ok(Expr::new(ExprKind::Int(v.wrapping_neg()), loc)),
            (UnOp::Minus, Some(Num::Flt(v))) => Ok(Expr::new(ExprKind::Flt(-v), loc)),
            (UnOp::Plus, Some(Num::Int(v))) => Ok(Expr::new(ExprKind::Int(v), loc)),
            (UnOp::Plus, Some(Num::Flt(v))) => Ok(Expr::new(ExprKind::Flt(v), loc)),
            _ => Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                loc,
            )),
        }
    }

    /// Fold arithmetic on literal operands. Division by a zero literal is
    /// a parse error.
    fn fold_binary(
        &self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        loc: &Loc,
    ) -> Result<Option<ExprKind>, HawkError> {
        if !matches!(
            op,
            BinOp::Plus | BinOp::Minus | BinOp::Mul | BinOp::Div | BinOp::Idiv | BinOp::Mod
        ) {
            return Ok(None);
        }
        let (Some(a), Some(b)) = (lit(lhs), lit(rhs)) else {
            return Ok(None);
        };
        let div_by_zero = || Err(HawkError::new(ErrorKind::DivByZero).at(loc.clone()));
        if let (Num::Int(a), Num::Int(b)) = (a, b) {
            return Ok(Some(match op {
                BinOp::Plus => ExprKind::Int(a.wrapping_add(b)),
                BinOp::Minus => ExprKind::Int(a.wrapping_sub(b)),
                BinOp::Mul => ExprKind::Int(a.wrapping_mul(b)),
                BinOp::Div => {
                    if b == 0 {
                        return div_by_zero();
                    }
                    if a % b == 0 {
                        ExprKind::Int(a / b)
                    } else {
                        ExprKind::Flt(a as f64 / b as f64)
                    }
                }
                BinOp::Idiv => {
                    if b == 0 {
                        return div_by_zero();
                    }
                    ExprKind::Int(a.wrapping_div(b))
                }
                BinOp::Mod => {
                    if b == 0 {
                        return div_by_zero();
                    }
                    ExprKind::Int(a.wrapping_rem(b))
                }
                _ => unreachable!(),
            }));
        }
        let (a, b) = (a.as_f64(), b.as_f64());
        Ok(Some(match op {
            BinOp::Plus => ExprKind::Flt(a + b),
            BinOp::Minus => ExprKind::Flt(a - b),
            BinOp::Mul => ExprKind::Flt(a * b),
            BinOp::Div => {
                if b == 0.0 {
                    return div_by_zero();
                }
                ExprKind::Flt(a / b)
            }
            BinOp::Idiv => {
                if b == 0.0 {
                    return div_by_zero();
                }
                ExprKind::Flt((a / b).trunc())
            }
            BinOp::Mod => {
                if b == 0.0 {
                    return div_by_zero();
                }
                ExprKind::Flt((self.hawk.prim().fmod)(a, b))
            }
            _ => unreachable!(),
        }))
    }
}

fn lit(e: &Expr) -> Option<Num> {
    match e.kind {
        ExprKind::Int(v) => Some(Num::Int(v)),
        ExprKind::Flt(v) => Some(Num::Flt(v)),
        _ => None,
    }
}
