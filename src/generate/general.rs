//! General-path kernel sources: arbitrary block size, optional zero-points,
//! plus the tiled fixed-block-32 variant.

use crate::dtype::DType;
use crate::packing::QuantDataType;
use crate::variant::{Block32Params, GeneralParams};
use crate::wgsl::{Expr, KernelBuilder, Stmt, Ty};

fn ident(name: &str) -> Expr {
    Expr::ident(name)
}

fn local_x() -> Expr {
    ident("local_id").member("x")
}

fn local_y() -> Expr {
    ident("local_id").member("y")
}

fn param(field: &str) -> Expr {
    ident("params").member(field)
}

/// `let col/row/batch` from a flattened packed output offset.
fn output_index_stmts(offset: Expr) -> Vec<Stmt> {
    let cols = param("output_shape").member("z");
    let rows = param("output_shape").member("y");
    vec![
        Stmt::let_("output_offset", offset),
        Stmt::let_("col", ident("output_offset").rem(cols.clone())),
        Stmt::let_(
            "row",
            (ident("output_offset") / cols.clone()).rem(rows.clone()),
        ),
        Stmt::let_("batch", ident("output_offset") / (cols * rows)),
    ]
}

/// `ceil((n_blocks_per_col + 1) / 2)`, the zero-point row stride in bytes
fn zero_point_stride_stmt() -> Stmt {
    Stmt::let_(
        "zero_point_bytes_per_col",
        (ident("n_blocks_per_col") + Expr::u32(2)) / Expr::u32(2),
    )
}

/// `quantized(elem(lower[0]), elem(upper[0]), ...)` in interleaved order
fn quantized_ctor(quant_ty: &Ty, elem: &Ty) -> Expr {
    let mut args = Vec::with_capacity(8);
    for i in 0..4 {
        args.push(Expr::cast(elem, ident("b_value_lower").index(Expr::u32(i))));
        args.push(Expr::cast(elem, ident("b_value_upper").index(Expr::u32(i))));
    }
    Expr::call(quant_ty.to_string(), args)
}

/// `quant_ty(zp, zp, ..., zp)` splat for matrix subtraction
fn zero_point_splat(quant_ty: &Ty, zp: &Expr) -> Expr {
    Expr::call(quant_ty.to_string(), vec![zp.clone(); 8])
}

fn unpack_stmts(b_value: Expr) -> Vec<Stmt> {
    vec![
        Stmt::let_(
            "b_value_lower",
            Expr::call("unpack4xU8", vec![b_value.clone().bitand(Expr::hex(0x0F0F0F0F))]),
        ),
        Stmt::let_(
            "b_value_upper",
            Expr::call(
                "unpack4xU8",
                vec![b_value.shr(Expr::u32(4)).bitand(Expr::hex(0x0F0F0F0F))],
            ),
        ),
    ]
}

/// Dot of the two staged `vec4` halves against the dequantized pair.
fn dot_pair(a0: Expr, a1: Expr) -> Expr {
    Expr::call("dot", vec![a0, ident("b_dequantized_values").index(Expr::u32(0))])
        + Expr::call("dot", vec![a1, ident("b_dequantized_values").index(Expr::u32(1))])
}

/// Tiled kernel for block size 32.
///
/// Workgroup layout: `workgroup_y` output columns by `workgroup_x` reduction
/// threads. Each K-tile is staged into shared memory once, then every thread
/// dequantizes one weight word chain and accumulates a partial dot product;
/// threads with `local_idx < workgroup_y` fold the partials and store.
pub fn block32_source(p: &Block32Params) -> String {
    let elem = Ty::Scalar(p.dtype);
    let a_ty = Ty::packed(p.components_a, p.dtype);
    let b_ty = if p.components_b == 1 {
        Ty::U32
    } else {
        Ty::VecU32(p.components_b)
    };
    let mat_ty = Ty::Named(format!("mat2x4<{}>", p.dtype.wgsl()));
    let workgroup_size = p.workgroup_x * p.workgroup_y;
    let a_length_per_tile = p.a_length_per_tile();
    let blocks_per_tile = p.blocks_per_tile();

    let mut kb = KernelBuilder::new();
    if p.dtype == DType::F16 {
        kb.enable_f16();
    }
    kb.workgroup_size([p.workgroup_x, p.workgroup_y, 1]);
    kb.define_struct(
        "Params",
        vec![
            ("a_shape".into(), Ty::VecU32(4)),
            ("output_shape".into(), Ty::VecU32(4)),
            ("meta".into(), Ty::VecU32(4)),
        ],
    );
    let in_a = kb.bind_storage("in_a", Ty::runtime_array(a_ty.clone()), true);
    let in_b = kb.bind_storage("in_b", Ty::runtime_array(b_ty), true);
    let scales = kb.bind_storage("scales", Ty::runtime_array(elem.clone()), true);
    let zero_points = p
        .has_zero_points
        .then(|| kb.bind_storage("zero_points", Ty::runtime_array(Ty::U32), true));
    let out = kb.bind_storage("output", Ty::runtime_array(elem.clone()), false);
    kb.bind_uniform("params", Ty::Named("Params".into()));

    let sub_a = kb.workgroup_array("sub_a", Ty::array(a_ty.clone(), a_length_per_tile));
    let inter = kb.workgroup_array(
        "inter_results",
        Ty::array(Ty::array(elem.clone(), p.workgroup_x), p.workgroup_y),
    );

    kb.stmts(output_index_stmts(
        ident("workgroup_idx") * Expr::u32(p.workgroup_y),
    ));
    kb.stmt(Stmt::let_("n_blocks_per_col", param("meta").member("y")));
    kb.stmt(Stmt::let_(
        "num_tiles",
        (ident("n_blocks_per_col") - Expr::u32(1)) / Expr::u32(blocks_per_tile) + Expr::u32(1),
    ));

    // stage one tile of A, then reduce one block per thread
    let mut tile_body = vec![
        Stmt::let_("a_col_start", ident("tile") * Expr::u32(a_length_per_tile)),
        Stmt::for_step(
            "a_offset",
            ident("local_idx"),
            Expr::u32(a_length_per_tile),
            workgroup_size,
            vec![
                Stmt::let_("a_col", ident("a_col_start") + ident("a_offset")),
                Stmt::If(
                    ident("a_col").lt(param("a_shape").member("z")),
                    vec![Stmt::assign(
                        sub_a.at(ident("a_offset")),
                        in_a.clone().index(
                            ident("batch") * param("a_shape").member("y")
                                * param("a_shape").member("z")
                                + ident("row") * param("a_shape").member("z")
                                + ident("a_col"),
                        ),
                    )],
                    vec![Stmt::assign(
                        sub_a.at(ident("a_offset")),
                        Expr::cast(&a_ty, Expr::LitI32(0)),
                    )],
                ),
            ],
        ),
        Stmt::Barrier,
        Stmt::let_("b_row", ident("col") + local_y()),
        Stmt::let_("block", ident("tile") * Expr::u32(blocks_per_tile) + local_x()),
    ];

    match &zero_points {
        Some(zp) => {
            tile_body.push(zero_point_stride_stmt());
            tile_body.push(Stmt::let_(
                "zero_point_byte_count",
                ident("b_row") * ident("zero_point_bytes_per_col")
                    + ident("block").shr(Expr::u32(1)),
            ));
            tile_body.push(Stmt::let_(
                "zero_point_word_index",
                ident("zero_point_byte_count").shr(Expr::u32(2)),
            ));
            tile_body.push(Stmt::let_(
                "zero_point_byte_offset",
                ident("zero_point_byte_count").bitand(Expr::u32(3)),
            ));
            tile_body.push(Stmt::let_(
                "zero_point_nibble_offset",
                ident("block").bitand(Expr::u32(1)),
            ));
            tile_body.push(Stmt::let_(
                "zero_point_bits_offset",
                ident("zero_point_byte_offset").shl(Expr::u32(3))
                    + ident("zero_point_nibble_offset").shl(Expr::u32(2)),
            ));
            tile_body.push(Stmt::let_(
                "zero_point_word",
                zp.clone()
                    .index(ident("zero_point_word_index"))
                    .shr(ident("zero_point_bits_offset")),
            ));
            tile_body.push(Stmt::let_(
                "zero_point",
                Expr::cast(&elem, ident("zero_point_word").bitand(Expr::hex(0xF))),
            ));
        }
        None => {
            tile_body.push(Stmt::let_("zero_point", Expr::cast(&elem, Expr::float(8.0))));
        }
    }

    // words-per-block along the packed B axis is 1, so one load per block
    tile_body.push(Stmt::var_init("scale", Expr::cast(&elem, Expr::LitI32(0))));
    tile_body.push(Stmt::Var(
        "b_data".into(),
        Some(if p.components_b == 1 {
            Ty::U32
        } else {
            Ty::VecU32(p.components_b)
        }),
        None,
    ));
    tile_body.push(Stmt::if_(
        ident("block").lt(ident("n_blocks_per_col")),
        vec![
            Stmt::assign(
                ident("scale"),
                scales
                    .clone()
                    .index(ident("b_row") * ident("n_blocks_per_col") + ident("block")),
            ),
            Stmt::assign(
                ident("b_data"),
                in_b.clone()
                    .index(ident("b_row") * ident("n_blocks_per_col") + ident("block")),
            ),
        ],
    ));
    tile_body.push(Stmt::var_init(
        "word_offset",
        local_x() * Expr::u32(32 / p.components_a),
    ));

    // unpack and accumulate one weight word per lane of b_data
    let a_pair: Vec<Stmt> = match p.components_a {
        1 => vec![
            Stmt::let_(
                "a_data0",
                Expr::call(
                    format!("vec4<{}>", p.dtype.wgsl()),
                    (0..4)
                        .map(|i| sub_a.at(ident("word_offset") + Expr::u32(i)))
                        .collect::<Vec<_>>(),
                ),
            ),
            Stmt::let_(
                "a_data1",
                Expr::call(
                    format!("vec4<{}>", p.dtype.wgsl()),
                    (4..8)
                        .map(|i| sub_a.at(ident("word_offset") + Expr::u32(i)))
                        .collect::<Vec<_>>(),
                ),
            ),
        ],
        2 => vec![
            Stmt::let_(
                "a_data0",
                Expr::call(
                    format!("vec4<{}>", p.dtype.wgsl()),
                    vec![
                        sub_a.at(ident("word_offset")),
                        sub_a.at(ident("word_offset") + Expr::u32(1)),
                    ],
                ),
            ),
            Stmt::let_(
                "a_data1",
                Expr::call(
                    format!("vec4<{}>", p.dtype.wgsl()),
                    vec![
                        sub_a.at(ident("word_offset") + Expr::u32(2)),
                        sub_a.at(ident("word_offset") + Expr::u32(3)),
                    ],
                ),
            ),
        ],
        _ => vec![
            Stmt::let_("a_data0", sub_a.at(ident("word_offset"))),
            Stmt::let_("a_data1", sub_a.at(ident("word_offset") + Expr::u32(1))),
        ],
    };

    let b_value = if p.components_b > 1 {
        ident("b_data").index(ident("i"))
    } else {
        ident("b_data")
    };
    let mut word_body = a_pair;
    word_body.push(Stmt::let_("b_value", b_value));
    word_body.extend(unpack_stmts(ident("b_value")));
    word_body.push(Stmt::let_("b_quantized_values", quantized_ctor(&mat_ty, &elem)));
    word_body.push(Stmt::let_(
        "b_dequantized_values",
        (ident("b_quantized_values") - zero_point_splat(&mat_ty, &ident("zero_point")))
            * ident("scale"),
    ));
    word_body.push(Stmt::add_assign(
        inter.at2(local_y(), local_x()),
        dot_pair(ident("a_data0"), ident("a_data1")),
    ));
    word_body.push(Stmt::add_assign(
        ident("word_offset"),
        Expr::u32(8 / p.components_a),
    ));

    tile_body.push(Stmt::for_(
        "i",
        Expr::u32(0),
        Expr::u32(p.components_b),
        word_body,
    ));
    tile_body.push(Stmt::Barrier);

    kb.stmt(Stmt::for_("tile", Expr::u32(0), ident("num_tiles"), tile_body));

    // fold each column's partials; one thread per output column
    kb.stmt(Stmt::if_(
        ident("local_idx").lt(Expr::u32(p.workgroup_y)),
        vec![
            Stmt::var_init("output_value", Expr::cast(&elem, Expr::LitI32(0))),
            Stmt::for_(
                "b",
                Expr::u32(0),
                Expr::u32(p.workgroup_x),
                vec![Stmt::add_assign(
                    ident("output_value"),
                    inter.at2(ident("local_idx"), ident("b")),
                )],
            ),
            Stmt::if_(
                (ident("col") + ident("local_idx")).lt(param("output_shape").member("z")),
                vec![Stmt::assign(
                    out.clone().index(
                        ident("batch") * param("output_shape").member("y")
                            * param("output_shape").member("z")
                            + ident("row") * param("output_shape").member("z")
                            + ident("col")
                            + ident("local_idx"),
                    ),
                    ident("output_value"),
                )],
            ),
        ],
    ));

    kb.render()
}

/// Generic kernel for arbitrary block sizes.
///
/// Each 64-thread workgroup owns one packed output element; threads stride
/// the block axis, accumulate per-thread partials in shared memory, then a
/// single thread folds and stores.
pub fn general_source(p: &GeneralParams) -> String {
    let elem = Ty::Scalar(p.dtype);
    let a_ty = Ty::packed(p.components_a, p.dtype);
    let b_ty = if p.components_b == 1 {
        Ty::U32
    } else {
        Ty::VecU32(p.components_b)
    };
    let y_ty = Ty::packed(p.components_y, p.dtype);
    let quant = QuantDataType::for_components(p.components_a);
    let quant_ty = Ty::Named(quant.wgsl(p.dtype));
    // unpacked output elements each thread accumulates
    let output_element_number = p.components_y * p.output_number;
    let shared_size = p.output_number * 64;
    let words_per_block = p.layout.blob_size_in_words / p.components_b;
    let vals_per_a_elem = 8 / p.components_a;

    let mut kb = KernelBuilder::new();
    if p.dtype == DType::F16 {
        kb.enable_f16();
    }
    kb.workgroup_size([64, 1, 1]);
    kb.define_struct(
        "Params",
        vec![
            ("a_shape".into(), Ty::VecU32(4)),
            ("output_shape".into(), Ty::VecU32(4)),
            ("meta".into(), Ty::VecU32(4)),
        ],
    );
    let in_a = kb.bind_storage("in_a", Ty::runtime_array(a_ty.clone()), true);
    let in_b = kb.bind_storage("in_b", Ty::runtime_array(b_ty), true);
    let scales = kb.bind_storage("scales", Ty::runtime_array(elem.clone()), true);
    let zero_points = p
        .has_zero_points
        .then(|| kb.bind_storage("zero_points", Ty::runtime_array(Ty::U32), true));
    let out = kb.bind_storage("output", Ty::runtime_array(y_ty.clone()), false);
    kb.bind_uniform("params", Ty::Named("Params".into()));

    let shared = kb.workgroup_array("partial_sums", Ty::array(y_ty.clone(), shared_size));

    let offset = if p.output_number == 1 {
        ident("workgroup_idx")
    } else {
        ident("workgroup_idx") * Expr::u32(p.output_number)
    };
    kb.stmts(output_index_stmts(offset));
    kb.stmt(Stmt::let_("n_blocks_per_col", param("meta").member("y")));

    let mut block_body = vec![
        Stmt::var_init(
            "word_offset",
            ident("block") * param("meta").member("x") / Expr::u32(p.components_a),
        ),
        Stmt::var_init("col_index", ident("col") * Expr::u32(p.components_y)),
    ];

    // one scale (and zero-point) per unpacked output column
    match &zero_points {
        Some(zp) => {
            block_body.push(zero_point_stride_stmt());
            block_body.push(Stmt::let_(
                "zero_point_nibble_offset",
                ident("block").bitand(Expr::u32(1)),
            ));
            for c in 0..output_element_number {
                block_body.push(Stmt::let_(
                    format!("scale{}", c),
                    scales
                        .clone()
                        .index(ident("col_index") * ident("n_blocks_per_col") + ident("block")),
                ));
                block_body.push(Stmt::let_(
                    format!("zero_point_byte_count{}", c),
                    ident("col_index") * ident("zero_point_bytes_per_col")
                        + ident("block").shr(Expr::u32(1)),
                ));
                block_body.push(Stmt::let_(
                    format!("zero_point_bits_offset{}", c),
                    (ident(&format!("zero_point_byte_count{}", c)).bitand(Expr::u32(3)))
                        .shl(Expr::u32(3))
                        + ident("zero_point_nibble_offset").shl(Expr::u32(2)),
                ));
                block_body.push(Stmt::let_(
                    format!("zero_point_word{}", c),
                    zp.clone()
                        .index(ident(&format!("zero_point_byte_count{}", c)).shr(Expr::u32(2)))
                        .shr(ident(&format!("zero_point_bits_offset{}", c))),
                ));
                block_body.push(Stmt::let_(
                    format!("zero_point{}", c),
                    Expr::cast(
                        &elem,
                        ident(&format!("zero_point_word{}", c)).bitand(Expr::hex(0xF)),
                    ),
                ));
                block_body.push(Stmt::add_assign(ident("col_index"), Expr::u32(1)));
            }
        }
        None => {
            block_body.push(Stmt::let_("zero_point", Expr::cast(&elem, Expr::float(8.0))));
            for c in 0..output_element_number {
                block_body.push(Stmt::let_(
                    format!("scale{}", c),
                    scales
                        .clone()
                        .index(ident("col_index") * ident("n_blocks_per_col") + ident("block")),
                ));
                block_body.push(Stmt::add_assign(ident("col_index"), Expr::u32(1)));
            }
        }
    }

    // per 32-bit word of the block
    let mut word_body = vec![Stmt::assign(
        ident("col_index"),
        ident("col") * Expr::u32(p.components_y),
    )];
    for c in 0..output_element_number {
        word_body.push(Stmt::let_(
            format!("b{}_data", c),
            in_b.clone().index(
                ident("col_index") * ident("n_blocks_per_col") * Expr::u32(words_per_block)
                    + ident("block") * Expr::u32(words_per_block)
                    + ident("word"),
            ),
        ));
        word_body.push(Stmt::add_assign(ident("col_index"), Expr::u32(1)));
    }

    // scratch shared by the per-column unroll below
    word_body.push(Stmt::var("b_value", Ty::U32));
    word_body.push(Stmt::var("b_value_lower", Ty::VecU32(4)));
    word_body.push(Stmt::var("b_value_upper", Ty::VecU32(4)));
    word_body.push(Stmt::var("b_quantized_values", quant_ty.clone()));
    word_body.push(Stmt::var("b_dequantized_values", quant_ty.clone()));

    // per lane of the loaded word vector: stage A, then dequantize and
    // accumulate for every output column
    let mut lane_body = vec![
        Stmt::var_init(
            "input_offset",
            ident("batch") * param("a_shape").member("y") * param("a_shape").member("z")
                + ident("row") * param("a_shape").member("z")
                + ident("word_offset"),
        ),
        Stmt::var("a_data", quant_ty.clone()),
        Stmt::for_(
            "j",
            Expr::u32(0),
            Expr::u32(vals_per_a_elem),
            vec![Stmt::If(
                (ident("word_offset") + ident("j")).lt(param("a_shape").member("z")),
                vec![
                    Stmt::assign(
                        ident("a_data").index(ident("j")),
                        in_a.clone().index(ident("input_offset")),
                    ),
                    Stmt::add_assign(ident("input_offset"), Expr::u32(1)),
                ],
                vec![Stmt::assign(
                    ident("a_data").index(ident("j")),
                    Expr::cast(&a_ty, Expr::LitI32(0)),
                )],
            )],
        ),
    ];

    for c in 0..output_element_number {
        let b_value = if p.components_b > 1 {
            ident(&format!("b{}_data", c)).index(ident("i"))
        } else {
            ident(&format!("b{}_data", c))
        };
        lane_body.push(Stmt::assign(ident("b_value"), b_value));
        lane_body.push(Stmt::assign(
            ident("b_value_lower"),
            Expr::call(
                "unpack4xU8",
                vec![ident("b_value").bitand(Expr::hex(0x0F0F0F0F))],
            ),
        ));
        lane_body.push(Stmt::assign(
            ident("b_value_upper"),
            Expr::call(
                "unpack4xU8",
                vec![ident("b_value").shr(Expr::u32(4)).bitand(Expr::hex(0x0F0F0F0F))],
            ),
        ));
        lane_body.push(Stmt::assign(
            ident("b_quantized_values"),
            quantized_ctor(&quant_ty, &elem),
        ));

        let zp = if p.has_zero_points {
            ident(&format!("zero_point{}", c))
        } else {
            ident("zero_point")
        };
        let scale = ident(&format!("scale{}", c));
        let dequant = if p.components_a == 1 {
            // element-wise: array types have no matrix arithmetic
            let terms: Vec<Expr> = (0..8)
                .map(|k| {
                    (ident("b_quantized_values").index(Expr::u32(k)) - zp.clone())
                        * scale.clone()
                })
                .collect();
            Expr::call(quant_ty.to_string(), terms)
        } else {
            (ident("b_quantized_values") - zero_point_splat(&quant_ty, &zp)) * scale
        };
        lane_body.push(Stmt::assign(ident("b_dequantized_values"), dequant));

        let acc = match p.components_a {
            1 => {
                let mut sum = ident("a_data").index(Expr::u32(0))
                    * ident("b_dequantized_values").index(Expr::u32(0));
                for k in 1..8 {
                    sum = sum
                        + ident("a_data").index(Expr::u32(k))
                            * ident("b_dequantized_values").index(Expr::u32(k));
                }
                sum
            }
            2 => {
                let mut sum = Expr::call(
                    "dot",
                    vec![
                        ident("a_data").index(Expr::u32(0)),
                        ident("b_dequantized_values").index(Expr::u32(0)),
                    ],
                );
                for k in 1..4 {
                    sum = sum
                        + Expr::call(
                            "dot",
                            vec![
                                ident("a_data").index(Expr::u32(k)),
                                ident("b_dequantized_values").index(Expr::u32(k)),
                            ],
                        );
                }
                sum
            }
            _ => dot_pair(
                ident("a_data").index(Expr::u32(0)),
                ident("a_data").index(Expr::u32(1)),
            ),
        };
        let slot = if p.output_number == 1 {
            local_x()
        } else {
            local_x() * Expr::u32(p.output_number) + Expr::u32(c / p.components_y)
        };
        let mut target = shared.at(slot);
        if p.components_y > 1 {
            target = target.index(Expr::u32(c % p.components_y));
        }
        lane_body.push(Stmt::add_assign(target, acc));
    }
    lane_body.push(Stmt::add_assign(
        ident("word_offset"),
        Expr::u32(vals_per_a_elem),
    ));

    word_body.push(Stmt::for_(
        "i",
        Expr::u32(0),
        Expr::u32(p.components_b),
        lane_body,
    ));
    block_body.push(Stmt::for_(
        "word",
        Expr::u32(0),
        Expr::u32(words_per_block),
        word_body,
    ));

    kb.stmt(Stmt::for_step(
        "block",
        local_x(),
        ident("n_blocks_per_col"),
        64,
        block_body,
    ));
    kb.stmt(Stmt::Barrier);

    kb.stmt(Stmt::if_(
        local_x().lt(Expr::u32(p.output_number)),
        vec![
            Stmt::var_init("output_value", Expr::cast(&y_ty, Expr::LitI32(0))),
            Stmt::var_init("shared_offset", local_x()),
            Stmt::let_(
                "blocks_num",
                Expr::call(
                    "min",
                    vec![Expr::u32(shared_size), ident("n_blocks_per_col")],
                ),
            ),
            Stmt::for_(
                "b",
                Expr::u32(0),
                ident("blocks_num"),
                vec![
                    Stmt::add_assign(ident("output_value"), shared.at(ident("shared_offset"))),
                    Stmt::add_assign(ident("shared_offset"), Expr::u32(p.output_number)),
                ],
            ),
            Stmt::assign(
                out.clone().index(
                    ident("batch") * param("output_shape").member("y")
                        * param("output_shape").member("z")
                        + ident("row") * param("output_shape").member("z")
                        + ident("col")
                        + local_x(),
                ),
                ident("output_value"),
            ),
        ],
    ));

    kb.render()
}
