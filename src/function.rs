//! PDF functions.
//!
//! Functions map one or more input values to one or more output values. They are
//! used as the color source of shadings and as the tint transform of separations.
//! The number of inputs and outputs of a function is computed once, when it is
//! registered, so that shadings and separations can be checked against it.

use std::ops::DerefMut;

use pdf_writer::{Chunk, Finish, Name, Ref};

use crate::chunk_container::ChunkContainerFn;
use crate::color::Color;
use crate::error::{CapyError, CapyResult};
use crate::handle::{Arena, DocumentId, FunctionId, Handle};
use crate::serialize::{Serialize, SerializeContext};
use crate::stream::FilterStreamBuilder;
use crate::util::check_finite;

/// A sampled function (type 0), defined by a table of sample values.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFunction {
    /// Pairs of minimum and maximum values, one pair per input.
    pub domain: Vec<f32>,
    /// Pairs of minimum and maximum values, one pair per output.
    pub range: Vec<f32>,
    /// The number of samples in each input dimension.
    pub size: Vec<u32>,
    /// The number of bits per sample.
    pub bits_per_sample: u8,
    /// The packed sample data.
    pub samples: Vec<u8>,
}

/// An exponential interpolation function (type 2) between two colors.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialFunction {
    /// The input domain.
    pub domain: [f32; 2],
    /// The output at the start of the domain.
    pub c0: Color,
    /// The output at the end of the domain.
    pub c1: Color,
    /// The interpolation exponent.
    pub n: f32,
}

/// A stitching function (type 3), which combines several one-input functions
/// over adjacent subdomains.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchingFunction {
    /// The input domain.
    pub domain: [f32; 2],
    /// The functions to stitch together.
    pub functions: Vec<FunctionId>,
    /// The boundaries between the subdomains. Must have one entry less than `functions`.
    pub bounds: Vec<f32>,
    /// A pair of values per function that maps its subdomain onto the function's domain.
    pub encode: Vec<f32>,
}

/// A PostScript calculator function (type 4).
#[derive(Debug, Clone, PartialEq)]
pub struct PostScriptFunction {
    /// Pairs of minimum and maximum values, one pair per input.
    pub domain: Vec<f32>,
    /// Pairs of minimum and maximum values, one pair per output.
    pub range: Vec<f32>,
    /// The program, enclosed in braces.
    pub code: String,
}

/// A function.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Sampled(SampledFunction),
    Exponential(ExponentialFunction),
    Stitching(StitchingFunction),
    PostScript(PostScriptFunction),
}

impl From<SampledFunction> for Function {
    fn from(value: SampledFunction) -> Self {
        Function::Sampled(value)
    }
}

impl From<ExponentialFunction> for Function {
    fn from(value: ExponentialFunction) -> Self {
        Function::Exponential(value)
    }
}

impl From<StitchingFunction> for Function {
    fn from(value: StitchingFunction) -> Self {
        Function::Stitching(value)
    }
}

impl From<PostScriptFunction> for Function {
    fn from(value: PostScriptFunction) -> Self {
        Function::PostScript(value)
    }
}

/// A registered function together with its arity.
#[derive(Debug, Clone)]
pub(crate) struct FunctionRecord {
    pub(crate) function: Function,
    pub(crate) inputs: usize,
    pub(crate) outputs: usize,
}

fn check_pairs(values: &[f32], what: &str) -> CapyResult<usize> {
    check_finite(values, what)?;

    if values.is_empty() || values.len() % 2 != 0 {
        return Err(CapyError::invalid(format!(
            "Function {what} must consist of min/max pairs."
        )));
    }

    if values.chunks_exact(2).any(|pair| pair[0] > pair[1]) {
        return Err(CapyError::invalid(format!(
            "Function {what} minimum exceeds maximum."
        )));
    }

    Ok(values.len() / 2)
}

impl FunctionRecord {
    /// Validate the function and compute its arity.
    pub(crate) fn new(
        function: Function,
        document: DocumentId,
        functions: &Arena<FunctionId, FunctionRecord>,
    ) -> CapyResult<Self> {
        let (inputs, outputs) = match &function {
            Function::Sampled(f) => {
                let inputs = check_pairs(&f.domain, "domain")?;
                let outputs = check_pairs(&f.range, "range")?;

                if f.size.len() != inputs || f.size.contains(&0) {
                    return Err(CapyError::invalid(
                        "Sampled function needs a positive size per input.",
                    ));
                }

                if !matches!(f.bits_per_sample, 1 | 2 | 4 | 8 | 12 | 16 | 24 | 32) {
                    return Err(CapyError::invalid(format!(
                        "Unsupported bits per sample {}.",
                        f.bits_per_sample
                    )));
                }

                let too_large = || CapyError::invalid("Sampled function is too large.");
                let bits = f
                    .size
                    .iter()
                    .map(|s| *s as usize)
                    .chain([outputs, f.bits_per_sample as usize])
                    .try_fold(1usize, |acc, v| acc.checked_mul(v))
                    .ok_or_else(too_large)?;

                if f.samples.len() != bits.div_ceil(8) {
                    return Err(CapyError::invalid(format!(
                        "Sampled function expects {} bytes of samples, got {}.",
                        bits.div_ceil(8),
                        f.samples.len()
                    )));
                }

                (inputs, outputs)
            }
            Function::Exponential(f) => {
                check_pairs(&f.domain, "domain")?;
                check_finite(&[f.n], "exponent")?;
                f.c0.validate(document)?;
                f.c1.validate(document)?;

                if matches!(f.c0, Color::Pattern(_)) || matches!(f.c1, Color::Pattern(_)) {
                    return Err(CapyError::TypeMismatch {
                        expected: "color",
                        found: "pattern",
                    });
                }

                if f.c0.color_space() != f.c1.color_space() {
                    return Err(CapyError::ColorSpaceMismatch(format!(
                        "C0 is {} but C1 is {}.",
                        f.c0.color_space().kind(),
                        f.c1.color_space().kind()
                    )));
                }

                (1, f.c0.components().len())
            }
            Function::Stitching(f) => {
                check_pairs(&f.domain, "domain")?;
                check_finite(&f.bounds, "bounds")?;
                check_finite(&f.encode, "encode")?;

                if f.functions.is_empty() {
                    return Err(CapyError::invalid("Stitching function has no functions."));
                }

                if f.bounds.len() + 1 != f.functions.len() {
                    return Err(CapyError::invalid(format!(
                        "Stitching function with {} functions needs {} bounds, got {}.",
                        f.functions.len(),
                        f.functions.len() - 1,
                        f.bounds.len()
                    )));
                }

                if f.encode.len() != 2 * f.functions.len() {
                    return Err(CapyError::invalid(format!(
                        "Stitching function with {} functions needs {} encode values, got {}.",
                        f.functions.len(),
                        2 * f.functions.len(),
                        f.encode.len()
                    )));
                }

                let mut last = f.domain[0];
                for bound in &f.bounds {
                    if *bound < last || *bound > f.domain[1] {
                        return Err(CapyError::invalid(
                            "Stitching bounds must be increasing and inside the domain.",
                        ));
                    }
                    last = *bound;
                }

                let mut outputs = None;
                for id in &f.functions {
                    id.check(document)?;
                    let sub = functions.get(*id)?;

                    if sub.inputs != 1 {
                        return Err(CapyError::invalid(
                            "Stitched functions must take exactly one input.",
                        ));
                    }

                    match outputs {
                        None => outputs = Some(sub.outputs),
                        Some(n) if n != sub.outputs => {
                            return Err(CapyError::ColorSpaceMismatch(format!(
                                "stitched functions produce {n} and {} outputs.",
                                sub.outputs
                            )))
                        }
                        Some(_) => {}
                    }
                }

                (1, outputs.unwrap_or_default())
            }
            Function::PostScript(f) => {
                let inputs = check_pairs(&f.domain, "domain")?;
                let outputs = check_pairs(&f.range, "range")?;
                let code = f.code.trim();

                if !code.starts_with('{') || !code.ends_with('}') {
                    return Err(CapyError::invalid(
                        "PostScript function code must be enclosed in braces.",
                    ));
                }

                (inputs, outputs)
            }
        };

        Ok(Self {
            function,
            inputs,
            outputs,
        })
    }
}

impl Serialize for FunctionRecord {
    fn chunk_container(&self) -> ChunkContainerFn {
        |cc| &mut cc.functions
    }

    fn serialize(&self, sc: &mut SerializeContext, root_ref: Ref) -> CapyResult<Chunk> {
        let mut chunk = Chunk::new();

        match &self.function {
            Function::Sampled(f) => {
                let stream = FilterStreamBuilder::new_from_binary_data(&f.samples)
                    .finish(sc.serialize_settings());
                let mut sampled = chunk.stream(root_ref, stream.encoded_data());
                sampled.pair(Name(b"FunctionType"), 0);
                sampled.insert(Name(b"Domain")).array().items(f.domain.iter().copied());
                sampled.insert(Name(b"Range")).array().items(f.range.iter().copied());
                sampled
                    .insert(Name(b"Size"))
                    .array()
                    .items(f.size.iter().map(|s| *s as i32));
                sampled.pair(Name(b"BitsPerSample"), f.bits_per_sample as i32);
                stream.write_filters(sampled.deref_mut());
                sampled.finish();
            }
            Function::Exponential(f) => {
                let mut exp = chunk.exponential_function(root_ref);
                exp.domain(f.domain);
                exp.c0(f.c0.components());
                exp.c1(f.c1.components());
                exp.n(f.n);
                exp.finish();
            }
            Function::Stitching(f) => {
                let refs = f
                    .functions
                    .iter()
                    .map(|id| sc.refs.functions.get(*id))
                    .collect::<CapyResult<Vec<_>>>()?;

                let mut stitching = chunk.stitching_function(root_ref);
                stitching.domain(f.domain);
                stitching.functions(refs);
                stitching.bounds(f.bounds.iter().copied());
                stitching.encode(f.encode.iter().copied());
                stitching.finish();
            }
            Function::PostScript(f) => {
                let code = f.code.trim().as_bytes();
                let stream = FilterStreamBuilder::new_from_content_stream(code, sc.serialize_settings())
                    .finish(sc.serialize_settings());
                let mut postscript = chunk.post_script_function(root_ref, stream.encoded_data());
                postscript.domain(f.domain.iter().copied());
                postscript.range(f.range.iter().copied());
                stream.write_filters(postscript.deref_mut());
                postscript.finish();
            }
        }

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential(c0: Color, c1: Color) -> Function {
        ExponentialFunction {
            domain: [0.0, 1.0],
            c0,
            c1,
            n: 1.0,
        }
        .into()
    }

    fn setup() -> (DocumentId, Arena<FunctionId, FunctionRecord>) {
        let doc = DocumentId::fresh();
        (doc, Arena::new(doc))
    }

    fn register(
        functions: &mut Arena<FunctionId, FunctionRecord>,
        doc: DocumentId,
        function: Function,
    ) -> CapyResult<FunctionId> {
        let record = FunctionRecord::new(function, doc, functions)?;
        Ok(functions.push(record))
    }

    #[test]
    fn huge_sample_grids_are_rejected() {
        let (doc, mut functions) = setup();
        let result = register(
            &mut functions,
            doc,
            SampledFunction {
                domain: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
                range: vec![0.0, 1.0],
                size: vec![u32::MAX; 3],
                bits_per_sample: 8,
                samples: vec![],
            }
            .into(),
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "Sampled function is too large."
        );
    }

    #[test]
    fn sample_data_length_is_checked() {
        let (doc, mut functions) = setup();
        let sampled = |samples: Vec<u8>| {
            Function::from(SampledFunction {
                domain: vec![0.0, 1.0],
                range: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
                size: vec![2],
                bits_per_sample: 4,
                samples,
            })
        };

        assert!(register(&mut functions, doc, sampled(vec![0; 2])).is_err());
        let id = register(&mut functions, doc, sampled(vec![0; 3])).unwrap();
        let record = functions.get(id).unwrap();
        assert_eq!((record.inputs, record.outputs), (1, 3));
    }

    #[test]
    fn exponential_arity_follows_colors() {
        let (doc, mut functions) = setup();
        let id = register(
            &mut functions,
            doc,
            exponential(Color::Rgb(1.0, 0.0, 0.0), Color::Rgb(0.0, 0.0, 1.0)),
        )
        .unwrap();

        let record = functions.get(id).unwrap();
        assert_eq!((record.inputs, record.outputs), (1, 3));
    }

    #[test]
    fn exponential_colors_must_share_colorspace() {
        let (doc, mut functions) = setup();
        let result = register(
            &mut functions,
            doc,
            exponential(Color::Gray(0.0), Color::Rgb(0.0, 0.0, 1.0)),
        );
        assert!(matches!(result, Err(CapyError::ColorSpaceMismatch(_))));
    }

    #[test]
    fn stitching_needs_one_bound_less_than_functions() {
        let (doc, mut functions) = setup();
        let a = register(
            &mut functions,
            doc,
            exponential(Color::Gray(0.0), Color::Gray(1.0)),
        )
        .unwrap();
        let b = register(
            &mut functions,
            doc,
            exponential(Color::Gray(1.0), Color::Gray(0.5)),
        )
        .unwrap();

        let stitched = |bounds: Vec<f32>| {
            Function::from(StitchingFunction {
                domain: [0.0, 1.0],
                functions: vec![a, b],
                bounds,
                encode: vec![0.0, 1.0, 0.0, 1.0],
            })
        };

        assert!(matches!(
            register(&mut functions, doc, stitched(vec![])),
            Err(CapyError::InvalidArgument(_))
        ));
        assert!(matches!(
            register(&mut functions, doc, stitched(vec![0.3, 0.6])),
            Err(CapyError::InvalidArgument(_))
        ));

        let id = register(&mut functions, doc, stitched(vec![0.5])).unwrap();
        assert_eq!(functions.get(id).unwrap().outputs, 1);
    }

    #[test]
    fn stitching_rejects_empty_function_list() {
        let (doc, mut functions) = setup();
        let function = StitchingFunction {
            domain: [0.0, 1.0],
            functions: vec![],
            bounds: vec![],
            encode: vec![],
        };
        assert!(register(&mut functions, doc, function.into()).is_err());
    }

    #[test]
    fn stitching_rejects_foreign_functions() {
        let (doc, mut functions) = setup();
        let (other_doc, mut other_functions) = setup();
        let foreign = register(
            &mut other_functions,
            other_doc,
            exponential(Color::Gray(0.0), Color::Gray(1.0)),
        )
        .unwrap();

        let function = StitchingFunction {
            domain: [0.0, 1.0],
            functions: vec![foreign],
            bounds: vec![],
            encode: vec![0.0, 1.0],
        };
        assert!(matches!(
            register(&mut functions, doc, function.into()),
            Err(CapyError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn postscript_arity_comes_from_domain_and_range() {
        let (doc, mut functions) = setup();
        let id = register(
            &mut functions,
            doc,
            PostScriptFunction {
                domain: vec![0.0, 1.0],
                range: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
                code: "{ dup 0.8 mul exch dup 0.2 mul exch 0 exch }".to_string(),
            }
            .into(),
        )
        .unwrap();

        let record = functions.get(id).unwrap();
        assert_eq!((record.inputs, record.outputs), (1, 4));

        let unbraced = PostScriptFunction {
            domain: vec![0.0, 1.0],
            range: vec![0.0, 1.0],
            code: "dup".to_string(),
        };
        assert!(register(&mut functions, doc, unbraced.into()).is_err());
    }

    #[test]
    fn sampled_function_checks_sample_count() {
        let (doc, mut functions) = setup();
        let function = |samples: Vec<u8>| {
            Function::from(SampledFunction {
                domain: vec![0.0, 1.0],
                range: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
                size: vec![2],
                bits_per_sample: 8,
                samples,
            })
        };

        assert!(register(&mut functions, doc, function(vec![0; 5])).is_err());
        assert!(register(&mut functions, doc, function(vec![0; 6])).is_ok());
    }
}
