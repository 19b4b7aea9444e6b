//! Typed view of content stream operations

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};

use super::objects::number;
use crate::error::{Error, Result};
use crate::geometry::{Matrix, Point};

/// Nonzero winding or even-odd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Path painting operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOperator {
    Stroke,
    CloseStroke,
    Fill,
    FillEvenOdd,
    FillStroke,
    FillStrokeEvenOdd,
    CloseFillStroke,
    CloseFillStrokeEvenOdd,
    EndPath,
}

impl PaintOperator {
    pub fn fill_rule(self) -> Option<FillRule> {
        match self {
            PaintOperator::Fill | PaintOperator::FillStroke | PaintOperator::CloseFillStroke => {
                Some(FillRule::NonZero)
            }
            PaintOperator::FillEvenOdd
            | PaintOperator::FillStrokeEvenOdd
            | PaintOperator::CloseFillStrokeEvenOdd => Some(FillRule::EvenOdd),
            _ => None,
        }
    }

    pub fn strokes(self) -> bool {
        matches!(
            self,
            PaintOperator::Stroke
                | PaintOperator::CloseStroke
                | PaintOperator::FillStroke
                | PaintOperator::FillStrokeEvenOdd
                | PaintOperator::CloseFillStroke
                | PaintOperator::CloseFillStrokeEvenOdd
        )
    }

    /// Closes the current subpath before painting
    pub fn closes(self) -> bool {
        matches!(
            self,
            PaintOperator::CloseStroke
                | PaintOperator::CloseFillStroke
                | PaintOperator::CloseFillStrokeEvenOdd
        )
    }
}

/// Element of a `TJ` array
#[derive(Debug, Clone, PartialEq)]
pub enum TextItem {
    Text(Vec<u8>, StringFormat),
    Adjustment(f64),
}

/// Every operator the interceptor distinguishes; the rest fall into `Other`
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Save,
    Restore,
    Transform(Matrix),

    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    CurveV(Point, Point),
    CurveY(Point, Point),
    ClosePath,
    Rectangle(f64, f64, f64, f64),
    Paint(PaintOperator),
    Clip(FillRule),

    BeginText,
    EndText,
    CharSpacing(f64),
    WordSpacing(f64),
    HorizontalScaling(f64),
    Leading(f64),
    Font(Vec<u8>, f64),
    Rise(f64),
    RenderMode(i64),

    MoveText(f64, f64),
    MoveTextSetLeading(f64, f64),
    TextMatrix(Matrix),
    NextLine,

    ShowText(Vec<u8>, StringFormat),
    ShowTextArray(Vec<TextItem>),
    NextLineShowText(Vec<u8>, StringFormat),
    NextLineSpacingShowText {
        word_spacing: f64,
        char_spacing: f64,
        text: Vec<u8>,
        format: StringFormat,
    },

    InvokeXObject(Vec<u8>),
    InlineImage,

    Other,
}

impl Operator {
    /// Validate operands and build the typed operator
    pub fn parse(operation: &Operation) -> Result<Self> {
        let op = operation.operator.as_str();
        let args = Operands {
            op,
            values: &operation.operands,
        };
        let operator = match op {
            "q" => {
                args.expect_len(0)?;
                Operator::Save
            }
            "Q" => {
                args.expect_len(0)?;
                Operator::Restore
            }
            "cm" => Operator::Transform(args.matrix()?),

            "m" => Operator::MoveTo(args.point_at::<2>(0)?),
            "l" => Operator::LineTo(args.point_at::<2>(0)?),
            "c" => {
                let n = args.numbers::<6>()?;
                Operator::CurveTo(
                    Point::new(n[0], n[1]),
                    Point::new(n[2], n[3]),
                    Point::new(n[4], n[5]),
                )
            }
            "v" => {
                let n = args.numbers::<4>()?;
                Operator::CurveV(Point::new(n[0], n[1]), Point::new(n[2], n[3]))
            }
            "y" => {
                let n = args.numbers::<4>()?;
                Operator::CurveY(Point::new(n[0], n[1]), Point::new(n[2], n[3]))
            }
            "h" => {
                args.expect_len(0)?;
                Operator::ClosePath
            }
            "re" => {
                let [x, y, w, h] = args.numbers::<4>()?;
                Operator::Rectangle(x, y, w, h)
            }

            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" => {
                args.expect_len(0)?;
                Operator::Paint(match op {
                    "S" => PaintOperator::Stroke,
                    "s" => PaintOperator::CloseStroke,
                    "f" | "F" => PaintOperator::Fill,
                    "f*" => PaintOperator::FillEvenOdd,
                    "B" => PaintOperator::FillStroke,
                    "B*" => PaintOperator::FillStrokeEvenOdd,
                    "b" => PaintOperator::CloseFillStroke,
                    "b*" => PaintOperator::CloseFillStrokeEvenOdd,
                    _ => PaintOperator::EndPath,
                })
            }
            "W" => {
                args.expect_len(0)?;
                Operator::Clip(FillRule::NonZero)
            }
            "W*" => {
                args.expect_len(0)?;
                Operator::Clip(FillRule::EvenOdd)
            }

            "BT" => {
                args.expect_len(0)?;
                Operator::BeginText
            }
            "ET" => {
                args.expect_len(0)?;
                Operator::EndText
            }
            "Tc" => Operator::CharSpacing(args.numbers::<1>()?[0]),
            "Tw" => Operator::WordSpacing(args.numbers::<1>()?[0]),
            "Tz" => Operator::HorizontalScaling(args.numbers::<1>()?[0]),
            "TL" => Operator::Leading(args.numbers::<1>()?[0]),
            "Ts" => Operator::Rise(args.numbers::<1>()?[0]),
            "Tr" => Operator::RenderMode(args.numbers::<1>()?[0] as i64),
            "Tf" => {
                args.expect_len(2)?;
                let font = args.name(0)?;
                let size = args.number(1)?;
                Operator::Font(font, size)
            }

            "Td" => {
                let [tx, ty] = args.numbers::<2>()?;
                Operator::MoveText(tx, ty)
            }
            "TD" => {
                let [tx, ty] = args.numbers::<2>()?;
                Operator::MoveTextSetLeading(tx, ty)
            }
            "Tm" => Operator::TextMatrix(args.matrix()?),
            "T*" => {
                args.expect_len(0)?;
                Operator::NextLine
            }

            "Tj" => {
                args.expect_len(1)?;
                let (text, format) = args.string(0)?;
                Operator::ShowText(text, format)
            }
            "'" => {
                args.expect_len(1)?;
                let (text, format) = args.string(0)?;
                Operator::NextLineShowText(text, format)
            }
            "\"" => {
                args.expect_len(3)?;
                let word_spacing = args.number(0)?;
                let char_spacing = args.number(1)?;
                let (text, format) = args.string(2)?;
                Operator::NextLineSpacingShowText {
                    word_spacing,
                    char_spacing,
                    text,
                    format,
                }
            }
            "TJ" => {
                args.expect_len(1)?;
                Operator::ShowTextArray(args.text_array(0)?)
            }

            "Do" => {
                args.expect_len(1)?;
                Operator::InvokeXObject(args.name(0)?)
            }
            "BI" => Operator::InlineImage,

            _ => Operator::Other,
        };
        Ok(operator)
    }

    /// `m`, `l`, `c`, `v`, `y`, `h` and `re`
    pub fn is_path_construction(&self) -> bool {
        matches!(
            self,
            Operator::MoveTo(_)
                | Operator::LineTo(_)
                | Operator::CurveTo(..)
                | Operator::CurveV(..)
                | Operator::CurveY(..)
                | Operator::ClosePath
                | Operator::Rectangle(..)
        )
    }
}

struct Operands<'a> {
    op: &'a str,
    values: &'a [Object],
}

impl Operands<'_> {
    fn expect_len(&self, expected: usize) -> Result<()> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(Error::malformed(
                self.op,
                format!("expected {} operand(s), found {}", expected, self.values.len()),
            ))
        }
    }

    fn number(&self, index: usize) -> Result<f64> {
        self.values
            .get(index)
            .and_then(number)
            .ok_or_else(|| Error::malformed(self.op, format!("operand {} is not a number", index)))
    }

    fn numbers<const N: usize>(&self) -> Result<[f64; N]> {
        self.expect_len(N)?;
        let mut values = [0.0; N];
        for (i, value) in values.iter_mut().enumerate() {
            *value = self.number(i)?;
        }
        Ok(values)
    }

    fn point_at<const N: usize>(&self, index: usize) -> Result<Point> {
        let n = self.numbers::<N>()?;
        Ok(Point::new(n[index], n[index + 1]))
    }

    fn matrix(&self) -> Result<Matrix> {
        let [a, b, c, d, e, f] = self.numbers::<6>()?;
        Ok(Matrix::new(a, b, c, d, e, f))
    }

    fn name(&self, index: usize) -> Result<Vec<u8>> {
        match self.values.get(index) {
            Some(Object::Name(name)) => Ok(name.clone()),
            _ => Err(Error::malformed(self.op, format!("operand {} is not a name", index))),
        }
    }

    fn string(&self, index: usize) -> Result<(Vec<u8>, StringFormat)> {
        match self.values.get(index) {
            Some(Object::String(bytes, format)) => Ok((bytes.clone(), format.clone())),
            _ => Err(Error::malformed(self.op, format!("operand {} is not a string", index))),
        }
    }

    fn text_array(&self, index: usize) -> Result<Vec<TextItem>> {
        let Some(Object::Array(items)) = self.values.get(index) else {
            return Err(Error::malformed(self.op, "operand is not an array"));
        };
        items
            .iter()
            .map(|item| match item {
                Object::String(bytes, format) => Ok(TextItem::Text(bytes.clone(), format.clone())),
                other => number(other)
                    .map(TextItem::Adjustment)
                    .ok_or_else(|| Error::malformed(self.op, "array element is neither string nor number")),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str, operands: Vec<Object>) -> Operation {
        Operation::new(name, operands)
    }

    #[test]
    fn test_parse_text_array() {
        let parsed = Operator::parse(&op(
            "TJ",
            vec![Object::Array(vec![
                Object::string_literal("A"),
                Object::Integer(-100),
                Object::String(b"B".to_vec(), StringFormat::Hexadecimal),
            ])],
        ))
        .unwrap();
        assert_eq!(
            parsed,
            Operator::ShowTextArray(vec![
                TextItem::Text(b"A".to_vec(), StringFormat::Literal),
                TextItem::Adjustment(-100.0),
                TextItem::Text(b"B".to_vec(), StringFormat::Hexadecimal),
            ])
        );
    }

    #[test]
    fn test_wrong_operand_count_is_malformed() {
        let err = Operator::parse(&op("cm", vec![Object::Integer(1); 5])).unwrap_err();
        assert!(matches!(err, Error::MalformedOperator { ref operator, .. } if operator == "cm"));
    }

    #[test]
    fn test_wrong_operand_type_is_malformed() {
        let err = Operator::parse(&op("Tf", vec![Object::Integer(1), Object::Integer(12)])).unwrap_err();
        assert!(matches!(err, Error::MalformedOperator { .. }));
        let err = Operator::parse(&op("Tj", vec![Object::Integer(1)])).unwrap_err();
        assert!(matches!(err, Error::MalformedOperator { .. }));
    }

    #[test]
    fn test_unknown_operator_falls_through() {
        let parsed = Operator::parse(&op("rg", vec![Object::Integer(1); 3])).unwrap();
        assert_eq!(parsed, Operator::Other);
        assert_eq!(Operator::parse(&op("F", vec![])).unwrap(), Operator::Paint(PaintOperator::Fill));
    }

    #[test]
    fn test_paint_operator_properties() {
        assert!(PaintOperator::CloseFillStrokeEvenOdd.closes());
        assert_eq!(PaintOperator::CloseFillStrokeEvenOdd.fill_rule(), Some(FillRule::EvenOdd));
        assert!(!PaintOperator::EndPath.strokes());
        assert_eq!(PaintOperator::Stroke.fill_rule(), None);
    }
}
