//! Expression lowering into high-level instructions

use kiln_ir::{BinOp, Const, HighOp, Input, InstrId, PrimOp, UnOp};
use oxc_ast::ast::*;
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator};

use crate::construct::{Arm, Constructor, FnState, RESULT};
use crate::error::{CompileError, CompileResult};

/// Assignable location, evaluated once
enum Place {
    Local(String),
    Global(String),
    Property { object: InstrId, key: InstrId },
}

fn number_const(value: f64) -> Const {
    let integral = value.fract() == 0.0 && !(value == 0.0 && value.is_sign_negative());
    if integral && value.abs() < (1u64 << 53) as f64 {
        Const::Smi(value as i64)
    } else {
        Const::Number(value)
    }
}

impl Constructor {
    /// Build `expr` and return the instruction holding its value
    pub(crate) fn expression(&mut self, f: &mut FnState, expr: &Expression) -> CompileResult<InstrId> {
        match expr {
            Expression::NumericLiteral(lit) => Ok(f.b.literal(number_const(lit.value))?),

            Expression::StringLiteral(lit) => Ok(f.b.literal(Const::Str(lit.value.to_string()))?),

            Expression::BooleanLiteral(lit) => Ok(f.b.literal(Const::Bool(lit.value))?),

            Expression::NullLiteral(_) => Ok(f.b.literal(Const::Null)?),

            Expression::Identifier(ident) => self.identifier(f, &ident.name),

            Expression::ThisExpression(_) => Ok(f.b.emit(PrimOp::This, [])?),

            Expression::BinaryExpression(binary) => self.binary(f, binary),

            Expression::LogicalExpression(logical) => self.logical(f, logical),

            Expression::UnaryExpression(unary) => self.unary(f, unary),

            Expression::AssignmentExpression(assign) => self.assignment(f, assign),

            Expression::CallExpression(call) => self.call(f, call),

            Expression::NewExpression(new_expr) => {
                let callee = self.expression(f, &new_expr.callee)?;
                let argc = self.arguments(f, &new_expr.arguments)?;
                Ok(f.b.emit(
                    HighOp::New,
                    [Input::Value(callee), Input::Const(Const::Raw(argc as i64))],
                )?)
            }

            Expression::StaticMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = f.b.literal(Const::Str(member.property.name.to_string()))?;
                self.load_property(f, object, key)
            }

            Expression::ComputedMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = self.expression(f, &member.expression)?;
                self.load_property(f, object, key)
            }

            Expression::ObjectExpression(obj) => self.object(f, obj),

            Expression::ArrayExpression(arr) => self.array(f, arr),

            Expression::FunctionExpression(func) => {
                let name = func.id.as_ref().map(|id| id.name.to_string());
                let index =
                    self.function(name.as_deref(), &func.params, func.body.as_deref(), false)?;
                Ok(f.b.emit(HighOp::Fn, [Input::Const(Const::Function(index))])?)
            }

            Expression::ArrowFunctionExpression(arrow) => {
                let index =
                    self.function(None, &arrow.params, Some(&arrow.body), arrow.expression)?;
                Ok(f.b.emit(HighOp::Fn, [Input::Const(Const::Function(index))])?)
            }

            Expression::ConditionalExpression(cond) => {
                let test = self.expression(f, &cond.test)?;
                let (then_block, else_block) = self.split(f, test)?;
                let before = f.env.clone();

                f.b.switch_to(then_block);
                let value = self.expression(f, &cond.consequent)?;
                f.env.insert(RESULT.to_owned(), value);
                let then_arm = Arm::capture(f);

                f.env = before;
                f.b.switch_to(else_block);
                let value = self.expression(f, &cond.alternate)?;
                f.env.insert(RESULT.to_owned(), value);
                let else_arm = Arm::capture(f);

                self.join(f, vec![then_arm, else_arm])?;
                self.take_result(f)
            }

            Expression::ParenthesizedExpression(paren) => self.expression(f, &paren.expression),

            Expression::SequenceExpression(seq) => {
                let mut last = None;
                for expr in &seq.expressions {
                    last = Some(self.expression(f, expr)?);
                }
                match last {
                    Some(value) => Ok(value),
                    None => Ok(f.b.literal(Const::Undefined)?),
                }
            }

            _ => Err(CompileError::unsupported("Unknown expression type")),
        }
    }

    fn take_result(&mut self, f: &mut FnState) -> CompileResult<InstrId> {
        match f.env.remove(RESULT) {
            Some(value) => Ok(value),
            None => Ok(f.b.literal(Const::Undefined)?),
        }
    }

    fn identifier(&mut self, f: &mut FnState, name: &str) -> CompileResult<InstrId> {
        if let Some(value) = f.env.get(name) {
            return Ok(*value);
        }
        if name == "undefined" {
            return Ok(f.b.literal(Const::Undefined)?);
        }
        Ok(f.b.emit(HighOp::LoadGlobal, [Input::Const(Const::Str(name.to_owned()))])?)
    }

    fn load_property(&mut self, f: &mut FnState, object: InstrId, key: InstrId) -> CompileResult<InstrId> {
        Ok(f.b.emit(
            HighOp::LoadProperty,
            [Input::Value(object), Input::Value(key)],
        )?)
    }

    fn binary_op(
        &mut self,
        f: &mut FnState,
        op: BinOp,
        left: InstrId,
        right: InstrId,
    ) -> CompileResult<InstrId> {
        Ok(f.b.emit(
            HighOp::Binary,
            [
                Input::Const(Const::BinOp(op)),
                Input::Value(left),
                Input::Value(right),
            ],
        )?)
    }

    fn binary(&mut self, f: &mut FnState, binary: &BinaryExpression) -> CompileResult<InstrId> {
        let left = self.expression(f, &binary.left)?;
        let right = self.expression(f, &binary.right)?;
        let (op, swap) = match binary.operator {
            BinaryOperator::Addition => (BinOp::Add, false),
            BinaryOperator::Subtraction => (BinOp::Sub, false),
            BinaryOperator::Multiplication => (BinOp::Mul, false),
            BinaryOperator::LessThan => (BinOp::Lt, false),
            BinaryOperator::LessEqualThan => (BinOp::Le, false),
            BinaryOperator::GreaterThan => (BinOp::Lt, true),
            BinaryOperator::GreaterEqualThan => (BinOp::Le, true),
            BinaryOperator::StrictEquality | BinaryOperator::Equality => (BinOp::StrictEq, false),
            BinaryOperator::StrictInequality | BinaryOperator::Inequality => {
                (BinOp::StrictNe, false)
            }
            BinaryOperator::Instanceof => (BinOp::InstanceOf, false),
            other => {
                return Err(CompileError::unsupported(format!(
                    "Binary operator {}",
                    other.as_str()
                )));
            }
        };
        if swap {
            self.binary_op(f, op, right, left)
        } else {
            self.binary_op(f, op, left, right)
        }
    }

    fn logical(&mut self, f: &mut FnState, logical: &LogicalExpression) -> CompileResult<InstrId> {
        let left = self.expression(f, &logical.left)?;
        let (if_true, if_false) = self.split(f, left)?;
        let (rhs_block, short_block) = match logical.operator {
            LogicalOperator::And => (if_true, if_false),
            LogicalOperator::Or => (if_false, if_true),
            LogicalOperator::Coalesce => return Err(CompileError::unsupported("Operator ??")),
        };

        let before = f.env.clone();
        f.b.switch_to(short_block);
        f.env.insert(RESULT.to_owned(), left);
        let short_arm = Arm::capture(f);

        f.env = before;
        f.b.switch_to(rhs_block);
        let right = self.expression(f, &logical.right)?;
        f.env.insert(RESULT.to_owned(), right);
        let rhs_arm = Arm::capture(f);

        self.join(f, vec![short_arm, rhs_arm])?;
        self.take_result(f)
    }

    fn unary(&mut self, f: &mut FnState, unary: &UnaryExpression) -> CompileResult<InstrId> {
        let op = match unary.operator {
            UnaryOperator::UnaryNegation => UnOp::Neg,
            UnaryOperator::LogicalNot => UnOp::Not,
            UnaryOperator::Void => {
                self.expression(f, &unary.argument)?;
                return Ok(f.b.literal(Const::Undefined)?);
            }
            UnaryOperator::Delete => return self.delete(f, &unary.argument),
            other => {
                return Err(CompileError::unsupported(format!(
                    "Unary operator {}",
                    other.as_str()
                )));
            }
        };
        let value = self.expression(f, &unary.argument)?;
        Ok(f.b.emit(
            HighOp::Unary,
            [Input::Const(Const::UnOp(op)), Input::Value(value)],
        )?)
    }

    fn delete(&mut self, f: &mut FnState, target: &Expression) -> CompileResult<InstrId> {
        match target {
            Expression::StaticMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = f.b.literal(Const::Str(member.property.name.to_string()))?;
                Ok(f.b.emit(
                    HighOp::DeleteProperty,
                    [Input::Value(object), Input::Value(key)],
                )?)
            }
            Expression::ComputedMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = self.expression(f, &member.expression)?;
                Ok(f.b.emit(
                    HighOp::DeleteProperty,
                    [Input::Value(object), Input::Value(key)],
                )?)
            }
            Expression::Identifier(ident) if !f.env.contains_key(ident.name.as_str()) => {
                Ok(f.b.emit(
                    HighOp::DeleteGlobal,
                    [Input::Const(Const::Str(ident.name.to_string()))],
                )?)
            }
            // Locals cannot be deleted.
            Expression::Identifier(_) => Ok(f.b.literal(Const::Bool(false))?),
            other => {
                self.expression(f, other)?;
                Ok(f.b.literal(Const::Bool(true))?)
            }
        }
    }

    fn place(&mut self, f: &mut FnState, target: &AssignmentTarget) -> CompileResult<Place> {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(ident) => {
                let name = ident.name.to_string();
                if f.top_level || !f.env.contains_key(&name) {
                    Ok(Place::Global(name))
                } else {
                    Ok(Place::Local(name))
                }
            }
            AssignmentTarget::StaticMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = f.b.literal(Const::Str(member.property.name.to_string()))?;
                Ok(Place::Property { object, key })
            }
            AssignmentTarget::ComputedMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = self.expression(f, &member.expression)?;
                Ok(Place::Property { object, key })
            }
            _ => Err(CompileError::InvalidAssignmentTarget),
        }
    }

    fn read_place(&mut self, f: &mut FnState, place: &Place) -> CompileResult<InstrId> {
        match place {
            Place::Local(name) | Place::Global(name) => self.identifier(f, name),
            Place::Property { object, key } => self.load_property(f, *object, *key),
        }
    }

    fn write_place(&mut self, f: &mut FnState, place: Place, value: InstrId) -> CompileResult<InstrId> {
        match place {
            Place::Local(name) => {
                f.env.insert(name, value);
                Ok(value)
            }
            Place::Global(name) => Ok(f.b.emit(
                HighOp::StoreGlobal,
                [Input::Const(Const::Str(name)), Input::Value(value)],
            )?),
            Place::Property { object, key } => Ok(f.b.emit(
                HighOp::StoreProperty,
                [Input::Value(object), Input::Value(key), Input::Value(value)],
            )?),
        }
    }

    fn assignment(&mut self, f: &mut FnState, assign: &AssignmentExpression) -> CompileResult<InstrId> {
        let compound = match assign.operator {
            AssignmentOperator::Assign => None,
            AssignmentOperator::Addition => Some(BinOp::Add),
            AssignmentOperator::Subtraction => Some(BinOp::Sub),
            AssignmentOperator::Multiplication => Some(BinOp::Mul),
            other => {
                return Err(CompileError::unsupported(format!(
                    "Assignment operator {}",
                    other.as_str()
                )));
            }
        };

        let place = self.place(f, &assign.left)?;
        let value = match compound {
            None => self.expression(f, &assign.right)?,
            Some(op) => {
                let current = self.read_place(f, &place)?;
                let right = self.expression(f, &assign.right)?;
                self.binary_op(f, op, current, right)?
            }
        };
        self.write_place(f, place, value)
    }

    /// Evaluate call arguments and push them, last argument first
    fn arguments(&mut self, f: &mut FnState, arguments: &[Argument]) -> CompileResult<usize> {
        let mut values = Vec::with_capacity(arguments.len());
        for arg in arguments {
            if matches!(arg, Argument::SpreadElement(_)) {
                return Err(CompileError::unsupported("Spread arguments"));
            }
            values.push(self.expression(f, arg.to_expression())?);
        }
        for value in values.iter().rev() {
            f.b.emit(PrimOp::PushArg, [Input::Value(*value)])?;
        }
        Ok(values.len())
    }

    fn call(&mut self, f: &mut FnState, call: &CallExpression) -> CompileResult<InstrId> {
        let (callee, this) = match &call.callee {
            Expression::StaticMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = f.b.literal(Const::Str(member.property.name.to_string()))?;
                (self.load_property(f, object, key)?, object)
            }
            Expression::ComputedMemberExpression(member) => {
                let object = self.expression(f, &member.object)?;
                let key = self.expression(f, &member.expression)?;
                (self.load_property(f, object, key)?, object)
            }
            other => {
                let callee = self.expression(f, other)?;
                (callee, f.b.literal(Const::Undefined)?)
            }
        };
        let argc = self.arguments(f, &call.arguments)?;
        Ok(f.b.emit(
            PrimOp::Call,
            [
                Input::Value(callee),
                Input::Value(this),
                Input::Const(Const::Raw(argc as i64)),
            ],
        )?)
    }

    fn object(&mut self, f: &mut FnState, obj: &ObjectExpression) -> CompileResult<InstrId> {
        let object = f.b.emit(HighOp::Object, [])?;
        for prop in &obj.properties {
            match prop {
                ObjectPropertyKind::ObjectProperty(prop) => {
                    let key = match &prop.key {
                        PropertyKey::StaticIdentifier(ident) => Const::Str(ident.name.to_string()),
                        PropertyKey::StringLiteral(lit) => Const::Str(lit.value.to_string()),
                        PropertyKey::NumericLiteral(lit) => number_const(lit.value),
                        _ => return Err(CompileError::unsupported("Computed property keys")),
                    };
                    let value = self.expression(f, &prop.value)?;
                    let key = f.b.literal(key)?;
                    f.b.emit(
                        HighOp::StoreProperty,
                        [Input::Value(object), Input::Value(key), Input::Value(value)],
                    )?;
                }
                ObjectPropertyKind::SpreadProperty(_) => {
                    return Err(CompileError::unsupported("Object spread"));
                }
            }
        }
        Ok(object)
    }

    fn array(&mut self, f: &mut FnState, arr: &ArrayExpression) -> CompileResult<InstrId> {
        let array = f.b.emit(
            HighOp::Array,
            [Input::Const(Const::Raw(arr.elements.len() as i64))],
        )?;
        for (i, elem) in arr.elements.iter().enumerate() {
            match elem {
                ArrayExpressionElement::SpreadElement(_) => {
                    return Err(CompileError::unsupported("Array spread"));
                }
                // Left as a hole
                ArrayExpressionElement::Elision(_) => {}
                _ => {
                    let value = self.expression(f, elem.to_expression())?;
                    let index = f.b.literal(Const::Smi(i as i64))?;
                    f.b.emit(
                        HighOp::StoreProperty,
                        [Input::Value(array), Input::Value(index), Input::Value(value)],
                    )?;
                }
            }
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_become_smis() {
        assert_eq!(number_const(3.0), Const::Smi(3));
        assert_eq!(number_const(-0.0), Const::Number(-0.0));
        assert_eq!(number_const(0.5), Const::Number(0.5));
    }
}
